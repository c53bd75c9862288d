// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, channel and forwarding failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("failed to decode private key: {0}")]
    KeyDecode(String),

    #[error("host key for {host}:{port} rejected")]
    HostKeyRejected { host: String, port: u16 },

    #[error("session is not connected")]
    NotConnected,

    #[error("channel error: {0}")]
    Channel(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("port forwarding failed: {0}")]
    ForwardFailed(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
