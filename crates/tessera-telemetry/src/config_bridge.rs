//! Conversion from `tessera_config::LoggingSection`.

use tessera_config::LoggingSection;

use crate::error::TelemetryResult;
use crate::logging::LogConfig;

/// Build a [`LogConfig`] from the `[logging]` section of the configuration.
///
/// # Errors
///
/// Returns an error if the section names an unknown format.
pub fn to_log_config(section: &LoggingSection) -> TelemetryResult<LogConfig> {
    let mut config = LogConfig::new(section.level.clone()).with_format(section.format.parse()?);
    config.directives.clone_from(&section.directives);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_section_maps_to_log_config() {
        let section = LoggingSection {
            level: "debug".to_owned(),
            format: "json".to_owned(),
            directives: vec!["tessera_timestamp=trace".to_owned()],
        };
        let config = to_log_config(&section).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directives, ["tessera_timestamp=trace"]);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let section = LoggingSection {
            format: "yaml".to_owned(),
            ..LoggingSection::default()
        };
        assert!(to_log_config(&section).is_err());
    }
}
