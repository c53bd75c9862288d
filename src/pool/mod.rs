// ABOUTME: Keyed pool of SSH clients and the operations callers issue against it.
// ABOUTME: Connect, exec, forward, shell I/O and disconnect, each addressed by a client key.

mod error;
mod record;
mod registry;
mod shell;

pub use error::{ClientError, ErrorCode, Result};
pub use record::ClientRecord;
pub use registry::Registry;

use crate::events::EventDispatcher;
use crate::ssh::{Credential, HostKeyPolicy, Session, SessionConfig, ShellSize};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// What `connect` does when the key is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Install the new session, then tear the old record down.
    #[default]
    ClosePrevious,
    /// Fail the connect and keep the existing record.
    Reject,
}

/// Settings applied to every session the pool opens.
#[derive(Debug, Clone, Default)]
pub struct PoolSettings {
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts_path: Option<PathBuf>,
    pub inactivity_timeout: Option<Duration>,
    pub keepalive_interval: Option<Duration>,
    pub command_timeout: Option<Duration>,
    pub shell_size: ShellSize,
    pub on_reconnect: ReconnectPolicy,
}

impl PoolSettings {
    fn session_config(&self, host: &str, port: u16, username: &str) -> SessionConfig {
        let mut config = SessionConfig::new(host, username)
            .port(port)
            .host_key_policy(self.host_key_policy)
            .inactivity_timeout(self.inactivity_timeout)
            .keepalive_interval(self.keepalive_interval)
            .command_timeout(self.command_timeout);
        if let Some(path) = &self.known_hosts_path {
            config = config.known_hosts_path(path);
        }
        config
    }
}

/// Holds back a new shell's output until dropped.
///
/// Lets a caller publish its own acknowledgement of `start_shell` before the
/// first output event is emitted.
#[derive(Debug)]
pub struct ShellStart {
    go: Option<oneshot::Sender<()>>,
}

impl Drop for ShellStart {
    fn drop(&mut self) {
        if let Some(go) = self.go.take() {
            let _ = go.send(());
        }
    }
}

/// Pool of SSH clients keyed by caller-chosen identifiers.
///
/// Operations on one key never touch another key's record. Shell start,
/// write and close for the same key are expected not to be issued
/// concurrently by the caller; the pool keeps itself consistent if they are,
/// but the outcome of such a race is whichever operation landed last.
pub struct SshPool {
    registry: Registry<ClientRecord>,
    events: Arc<EventDispatcher>,
    settings: PoolSettings,
}

impl SshPool {
    /// Create a pool. Must be called inside a tokio runtime.
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            registry: Registry::new(),
            events: Arc::new(EventDispatcher::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// The outbound shell event stream.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn keys(&self) -> Vec<String> {
        self.registry.keys()
    }

    fn client(&self, key: &str) -> Result<Arc<ClientRecord>> {
        self.registry
            .get(key)
            .ok_or_else(|| ClientError::UnknownClient(key.to_string()))
    }

    /// Open and authenticate a session, registering it under `key`.
    pub async fn connect(
        &self,
        key: &str,
        host: &str,
        port: u16,
        username: &str,
        credential: &Credential,
    ) -> Result<()> {
        let reject = self.settings.on_reconnect == ReconnectPolicy::Reject;
        if reject && self.registry.contains(key) {
            return Err(ClientError::Connection(format!(
                "client {} is already connected",
                key
            )));
        }

        let config = self.settings.session_config(host, port, username);
        let session = Session::connect(config, credential).await.map_err(|e| {
            tracing::warn!(key, host, port, "connection failed: {}", e);
            ClientError::Connection(e.to_string())
        })?;
        let record = Arc::new(ClientRecord::new(key, session));

        if reject {
            if let Err(existing) = self.registry.put_if_absent(key, Arc::clone(&record)) {
                tracing::debug!(key, existing = ?existing, "lost connect race; discarding new session");
                record.teardown().await;
                return Err(ClientError::Connection(format!(
                    "client {} is already connected",
                    key
                )));
            }
        } else if let Some(previous) = self.registry.put(key, record) {
            tracing::warn!(key, "replacing existing client; closing its session");
            previous.teardown().await;
        }

        tracing::info!(key, host, port, "client connected");
        Ok(())
    }

    /// Run `command` to completion and return its stdout, every line
    /// terminated with `\r\n`. No partial output is returned on failure.
    pub async fn execute(&self, key: &str, command: &str) -> Result<String> {
        let record = self.client(key)?;
        let output = record.session().exec(command).await.map_err(|e| {
            tracing::warn!(key, "error executing command: {}", e);
            ClientError::Execute(e.to_string())
        })?;
        tracing::debug!(key, exit_code = ?output.exit_code, "command finished");
        Ok(output.stdout_crlf())
    }

    /// Forward `127.0.0.1:local_port` to `remote_host:remote_port` through
    /// the session. Returns the port actually bound.
    pub async fn forward_local(
        &self,
        key: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<u16> {
        let record = self.client(key)?;
        let forward = record
            .session()
            .forward_local(local_port, remote_host, remote_port)
            .await
            .map_err(|e| {
                tracing::warn!(key, "error setting up port forward: {}", e);
                ClientError::PortForward(e.to_string())
            })?;
        let bound = forward.local_port();
        record.add_forward(forward);
        Ok(bound)
    }

    /// Open a shell with pty type `pty_type`. Output is streamed as events
    /// once the returned [`ShellStart`] is dropped, and keeps flowing until
    /// the remote closes or `close_shell` is called.
    ///
    /// A shell already active on the key is closed first.
    pub async fn start_shell(&self, key: &str, pty_type: &str) -> Result<ShellStart> {
        let record = self.client(key)?;

        if let Some(previous) = record.take_shell() {
            tracing::debug!(key, "closing active shell before starting a new one");
            previous.shutdown(key).await;
        }

        let channel = record
            .session()
            .open_shell(pty_type, self.settings.shell_size)
            .await
            .map_err(|e| {
                tracing::warn!(key, "error starting shell: {}", e);
                ClientError::Shell(e.to_string())
            })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let (go_tx, go_rx) = oneshot::channel();
        let (generation, displaced) = record.install_shell(channel.writer, stop_tx);
        if let Some(displaced) = displaced {
            displaced.shutdown(key).await;
        }

        tokio::spawn(shell::read_loop(
            shell::ReadLoop {
                key: key.to_string(),
                record: Arc::downgrade(&record),
                generation,
                events: Arc::clone(&self.events),
            },
            channel.reader,
            go_rx,
            stop_rx,
        ));

        tracing::debug!(key, pty_type, "shell started");
        Ok(ShellStart { go: Some(go_tx) })
    }

    /// Write raw text to the active shell and flush.
    pub async fn write_to_shell(&self, key: &str, text: &str) -> Result<()> {
        let record = self.client(key)?;
        let writer = record
            .shell_writer()
            .ok_or_else(|| ClientError::Write(format!("no active shell for {}", key)))?;

        let mut writer = writer.lock().await;
        writer.write(text.as_bytes()).await.map_err(|e| {
            tracing::warn!(key, "error writing to shell: {}", e);
            ClientError::Write(e.to_string())
        })
    }

    /// Close the key's shell if one is active. Safe to call repeatedly.
    pub async fn close_shell(&self, key: &str) {
        if let Some(record) = self.registry.get(key) {
            record.close_shell().await;
        }
    }

    /// Whether `key` names a registered, still-connected session.
    pub fn is_connected(&self, key: &str) -> bool {
        self.registry
            .get(key)
            .is_some_and(|record| record.session().is_connected())
    }

    /// Disconnect the key's session and drop it from the pool.
    ///
    /// An active shell is not closed first; its read loop ends when the
    /// connection goes away.
    pub async fn disconnect(&self, key: &str) -> Result<()> {
        let record = self.client(key)?;
        record.stop_forwards().await;
        let result = record.session().disconnect().await;
        self.registry.remove_if_same(key, &record);

        result.map_err(|e| {
            tracing::warn!(key, "error disconnecting: {}", e);
            ClientError::Execute(e.to_string())
        })?;
        tracing::info!(key, "client disconnected");
        Ok(())
    }

    /// Tear down every client in the pool.
    pub async fn close_all(&self) {
        let records = self.registry.drain();
        if records.is_empty() {
            return;
        }
        tracing::debug!(count = records.len(), "closing all clients");
        futures::future::join_all(records.iter().map(|(_, record)| record.teardown())).await;
    }
}
