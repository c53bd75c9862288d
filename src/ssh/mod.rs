// ABOUTME: SSH client module for remote server connections.
// ABOUTME: Password or in-memory key authentication, exec, shells and local forwards.

mod client;
mod credential;
mod error;
mod forward;
pub mod lines;
mod shell;

pub use client::{CommandOutput, HostKeyPolicy, Session, SessionConfig};
pub use credential::{Credential, KeyPair};
pub use error::{Error, Result};
pub use forward::ForwardHandle;
pub use shell::{ShellChannel, ShellReader, ShellSize, ShellWriter};
