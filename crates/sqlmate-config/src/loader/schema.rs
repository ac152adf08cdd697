//! Shape checks for raw config layers, run before serde decoding so that
//! typos surface as path-qualified errors instead of silently defaulting.

use crate::ConfigError;
use serde_json::Value;

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Flag,
    Count,
    Section(&'static [Field]),
}

#[derive(Clone, Copy)]
struct Field {
    name: &'static str,
    kind: Kind,
}

const fn field(name: &'static str, kind: Kind) -> Field {
    Field { name, kind }
}

const STORAGE: &[Field] = &[
    field("path", Kind::Text),
    field("capacity_bytes", Kind::Count),
    field("compress", Kind::Flag),
];

const EVICTION: &[Field] = &[
    field("chat_batch", Kind::Count),
    field("prune_batch", Kind::Count),
    field("max_attempts", Kind::Count),
];

const ROOT: &[Field] = &[
    field("$schema", Kind::Text),
    field("storage", Kind::Section(STORAGE)),
    field("eviction", Kind::Section(EVICTION)),
];

/// Check one layer (or the merged document) against the known keys and types.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    check(value, Kind::Section(ROOT), layer, "")
}

fn check(value: &Value, kind: Kind, layer: &str, path: &str) -> Result<(), ConfigError> {
    let expected = match kind {
        Kind::Text if value.is_string() => return Ok(()),
        Kind::Flag if value.is_boolean() => return Ok(()),
        Kind::Count if value.is_u64() => return Ok(()),
        Kind::Text => "expected string",
        Kind::Flag => "expected bool",
        Kind::Count => "expected non-negative integer",
        Kind::Section(fields) => {
            let Some(map) = value.as_object() else {
                return Err(invalid_field(layer, path, "expected object"));
            };
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let Some(known) = fields.iter().find(|field| field.name == key.as_str()) else {
                    return Err(invalid_field(layer, &child_path, "unknown key"));
                };
                check(child, known.kind, layer, &child_path)?;
            }
            return Ok(());
        }
    };
    Err(invalid_field(layer, path, expected))
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidField {
        path: format!("{layer}:{}", if path.is_empty() { "root" } else { path }),
        message: message.to_string(),
    }
}
