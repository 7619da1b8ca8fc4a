//! Environment variable fallbacks.
//!
//! Env vars are a **fallback**, not an override: they only apply to fields
//! that no config file set.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: ValueKind,
}

#[derive(Clone, Copy)]
enum ValueKind {
    String,
    Integer,
    Boolean,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TESSERA_MODE",
        field_path: "session.mode",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_MAX_ARTIFACT_SIZE",
        field_path: "session.max_artifact_size",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "TESSERA_CAPTURE_GIT",
        field_path: "session.capture_git",
        kind: ValueKind::Boolean,
    },
    EnvMapping {
        var_name: "TESSERA_ALLOW_EPHEMERAL",
        field_path: "session.allow_ephemeral",
        kind: ValueKind::Boolean,
    },
    EnvMapping {
        var_name: "TESSERA_DURABILITY",
        field_path: "session.durability",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_PRIVATE_KEY",
        field_path: "identity.private_key",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_CERTIFICATE",
        field_path: "identity.certificate",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_TSA_URL",
        field_path: "timestamp.url",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_TSA_POLICY",
        field_path: "timestamp.policy_oid",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_TSA_TIMEOUT_SECS",
        field_path: "timestamp.timeout_secs",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "TESSERA_VERIFY_STRICT",
        field_path: "verify.strict",
        kind: ValueKind::Boolean,
    },
    EnvMapping {
        var_name: "TESSERA_LOG_LEVEL",
        field_path: "logging.level",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "TESSERA_LOG_FORMAT",
        field_path: "logging.format",
        kind: ValueKind::String,
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer. Values coming only from the embedded defaults may
/// be replaced.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field(merged, mapping.field_path, coerce(mapping.kind, val));
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Typed value for a known field. Unparseable values stay strings, so the
/// deserializer reports them against the right field.
fn coerce(kind: ValueKind, val: &str) -> toml::Value {
    match kind {
        ValueKind::Integer => val
            .parse::<i64>()
            .map_or_else(|_| toml::Value::String(val.to_owned()), toml::Value::Integer),
        ValueKind::Boolean => val
            .parse::<bool>()
            .map_or_else(|_| toml::Value::String(val.to_owned()), toml::Value::Boolean),
        ValueKind::String => toml::Value::String(val.to_owned()),
    }
}

fn set_field(root: &mut toml::Value, path: &str, val: toml::Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), val);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
