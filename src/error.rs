// ABOUTME: Application-wide error types for sshpool.
// ABOUTME: Covers configuration loading, host profiles and I/O outside the pool itself.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid host address: {0}")]
    InvalidAddress(String),

    #[error("no credential configured for {0}")]
    MissingCredential(String),

    #[error("{code}: {message}")]
    Client { code: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::pool::ClientError> for Error {
    fn from(e: crate::pool::ClientError) -> Self {
        Error::Client {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
