use thiserror::Error;

/// Failures while reading, parsing, or checking sqlmate config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),
    /// Not valid JSON5.
    #[error("config is not valid JSON5: {0}")]
    Parse(#[from] json5::Error),
    /// Valid JSON5 that does not fit the config model.
    #[error("config does not match the expected model: {0}")]
    Decode(#[from] serde_json::Error),
    /// Unknown key or wrong type; `path` is `<layer>:<dotted.key>`.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    #[error("invalid storage limits: {0}")]
    InvalidLimits(String),
}
