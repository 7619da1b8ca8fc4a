//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` as the base
//! 2. Merge `/etc/tessera/config.toml` (system)
//! 3. Merge `~/.tessera/config.toml` (user)
//! 4. Merge `{workspace}/.tessera/config.toml` (workspace)
//! 5. Apply `TESSERA_*` env var fallbacks for fields no file set
//! 6. Deserialize the merged tree into [`Config`]
//! 7. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

const SYSTEM_CONFIG: &str = "/etc/tessera/config.toml";

/// A resolved configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path to the layer that set it.
    pub field_sources: FieldSources,
    /// Config files that were loaded, in precedence order.
    pub loaded_files: Vec<PathBuf>,
}

impl ResolvedConfig {
    /// Which layer set `field` (e.g. `"session.mode"`).
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<ConfigLayer> {
        self.field_sources.get(field).copied()
    }
}

/// Load the configuration with layered file precedence.
///
/// `workspace_root` is the root of the current project. If `None`, the
/// workspace layer is skipped. `home_override` replaces the user's home
/// directory for discovery of `.tessera/config.toml`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable, oversized or
/// malformed, or if the merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let home_dir = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };
    load_layers(
        Path::new(SYSTEM_CONFIG),
        &home_dir,
        workspace_root,
        &collect_env_vars(),
    )
}

fn load_layers(
    system_path: &Path,
    home_dir: &Path,
    workspace_root: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    record_leaves(&merged, "", ConfigLayer::Defaults, &mut field_sources);

    let user_path = home_dir.join(".tessera").join("config.toml");
    let workspace_path = workspace_root.map(|ws| ws.join(".tessera").join("config.toml"));

    let layers = [
        (Some(system_path.to_path_buf()), ConfigLayer::System),
        (Some(user_path), ConfigLayer::User),
        (workspace_path, ConfigLayer::Workspace),
    ];

    let mut loaded_files = Vec::new();
    for (path, layer) in layers {
        let Some(path) = path else {
            continue;
        };
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", layer, &mut field_sources);
            info!(path = %path.display(), %layer, "loaded config");
            loaded_files.push(path);
        }
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// Fields the file omits take their defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or
/// validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read, then checks the size of what was read.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let size = content.len() as u64;
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge {
            path: path.display().to_string(),
            size,
            limit: MAX_CONFIG_FILE_SIZE,
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, body: &str) {
        let dir = root.join(".tessera");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), body).unwrap();
    }

    fn load_in(
        home: &Path,
        workspace: Option<&Path>,
        env: &[(&str, &str)],
    ) -> ConfigResult<ResolvedConfig> {
        let env = env
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        load_layers(
            &home.join("no-system-config.toml"),
            home,
            workspace,
            &env,
        )
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_without_files() {
        let home = tempfile::tempdir().unwrap();
        let resolved = load_in(home.path(), None, &[]).unwrap();
        assert_eq!(resolved.config, Config::default());
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.source_of("session.mode"),
            Some(ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_workspace_overrides_user() {
        let home = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        write_config(
            home.path(),
            "[session]\nmode = \"normal\"\ncapture_git = false\n",
        );
        write_config(workspace.path(), "[session]\nmode = \"light\"\n");

        let resolved = load_in(home.path(), Some(workspace.path()), &[]).unwrap();
        assert_eq!(resolved.config.session.mode, "light");
        assert!(!resolved.config.session.capture_git);
        assert_eq!(resolved.loaded_files.len(), 2);
        assert_eq!(
            resolved.source_of("session.mode"),
            Some(ConfigLayer::Workspace)
        );
        assert_eq!(
            resolved.source_of("session.capture_git"),
            Some(ConfigLayer::User)
        );
    }

    #[test]
    fn test_env_is_fallback_only() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "[logging]\nlevel = \"warn\"\n");

        let resolved = load_in(
            home.path(),
            None,
            &[
                ("TESSERA_LOG_LEVEL", "trace"),
                ("TESSERA_TSA_URL", "https://tsa.example/tsr"),
            ],
        )
        .unwrap();
        assert_eq!(resolved.config.logging.level, "warn");
        assert_eq!(
            resolved.config.timestamp.url.as_deref(),
            Some("https://tsa.example/tsr")
        );
        assert_eq!(
            resolved.source_of("timestamp.url"),
            Some(ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_invalid_merged_config_rejected() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "[session]\ndurability = \"eventually\"\n");

        let result = load_in(home.path(), None, &[]);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "session.durability"
        ));
    }

    #[test]
    fn test_malformed_file_names_path() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "[session\nmode = ");

        match load_in(home.path(), None, &[]) {
            Err(ConfigError::ParseError { path, .. }) => assert!(path.ends_with("config.toml")),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "[timestamp]\ntimeout_secs = \"soon\"\n");

        let result = load_in(home.path(), None, &[]);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.toml");
        std::fs::write(&path, "[verify]\nstrict = true\n").unwrap();

        let config = load_file(&path).unwrap();
        assert!(config.verify.strict);
        assert_eq!(config.timestamp.max_attempts, 3);
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = format!("x = \"{}\"", "a".repeat(1_100_000));
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(
            matches!(result, Err(ConfigError::TooLarge { limit: MAX_CONFIG_FILE_SIZE, .. })),
            "Expected TooLarge for oversized config, got: {result:?}"
        );
    }
}
