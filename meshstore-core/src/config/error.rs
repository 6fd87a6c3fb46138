//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("malformed configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Environment override that does not parse
    #[error("{var}: {reason}")]
    InvalidOverride { var: String, reason: String },

    #[error("privileged key {key} for {type_name}: {reason}")]
    InvalidPrivilegedKey { type_name: String, key: String, reason: String },

    #[error("invalid configuration: {0}")]
    ValidationFailed(String),
}
