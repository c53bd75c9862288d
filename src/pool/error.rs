// ABOUTME: Errors returned by keyed pool operations.
// ABOUTME: Each variant maps to the stable error code reported to callers.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Connection(String),

    #[error("unknown client: {0}")]
    UnknownClient(String),

    #[error("{0}")]
    Execute(String),

    #[error("{0}")]
    PortForward(String),

    #[error("{0}")]
    Shell(String),

    #[error("{0}")]
    Write(String),
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Connection(_) => ErrorCode::ConnectionFailure,
            ClientError::UnknownClient(_) => ErrorCode::UnknownClient,
            ClientError::Execute(_) => ErrorCode::ExecuteFailure,
            ClientError::PortForward(_) => ErrorCode::PortForwardFailure,
            ClientError::Shell(_) => ErrorCode::ShellFailure,
            ClientError::Write(_) => ErrorCode::WriteFailure,
        }
    }
}

/// Error codes as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ConnectionFailure,
    UnknownClient,
    ExecuteFailure,
    PortForwardFailure,
    ShellFailure,
    WriteFailure,
    /// Request named a method the surface does not know.
    NotImplemented,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionFailure => "connection_failure",
            ErrorCode::UnknownClient => "unknown_client",
            ErrorCode::ExecuteFailure => "execute_failure",
            ErrorCode::PortForwardFailure => "portforwardL_failure",
            ErrorCode::ShellFailure => "shell_failure",
            ErrorCode::WriteFailure => "write_failure",
            ErrorCode::NotImplemented => "not_implemented",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
