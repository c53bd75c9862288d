// ABOUTME: Library root for sshpool - a keyed pool of SSH client sessions.
// ABOUTME: The sshpool binary in main.rs is a thin front end over these modules.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pool;
pub mod ssh;
