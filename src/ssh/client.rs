// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, authentication, host key policy and command execution.

use super::credential::{AuthMethod, Credential};
use super::error::{Error, Result};
use super::forward::{self, ForwardHandle};
use super::shell::{self, ShellChannel, ShellSize};
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::HashAlg;
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{ChannelMsg, Disconnect};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How the server's host key is verified during connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept every host key without checking. Insecure; each acceptance is logged.
    #[default]
    AcceptAny,
    /// Accept and record unknown hosts, reject keys that changed.
    TrustOnFirstUse,
    /// Only hosts already present in known_hosts are accepted.
    Strict,
}

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    pub host_key_policy: HostKeyPolicy,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Transport inactivity timeout. None keeps the transport default.
    pub inactivity_timeout: Option<Duration>,
    pub keepalive_interval: Option<Duration>,
    /// Upper bound for `exec`. None waits for the command to finish.
    pub command_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            inactivity_timeout: None,
            keepalive_interval: None,
            command_timeout: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn inactivity_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, if the server reported one before closing the channel.
    pub exit_code: Option<u32>,
    /// Raw standard output bytes.
    pub stdout: Vec<u8>,
    /// Raw standard error bytes.
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output re-terminated with `\r\n` after every line.
    pub fn stdout_crlf(&self) -> String {
        super::lines::normalize(&self.stdout, "\r\n")
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
    rejected: Arc<AtomicBool>,
}

impl SshHandler {
    fn learn(&self, key: &ssh_key::PublicKey) {
        let learn_result = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learn_result {
            tracing::warn!("Failed to save host key to known_hosts: {}", e);
        }
    }

    fn verdict(&self, server_public_key: &ssh_key::PublicKey) -> bool {
        if self.policy == HostKeyPolicy::AcceptAny {
            tracing::warn!(
                host = %self.host,
                port = self.port,
                fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
                "host key verification disabled; accepting server key"
            );
            return true;
        }

        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => true,
            Ok(false) if self.policy == HostKeyPolicy::TrustOnFirstUse => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                self.learn(server_public_key);
                true
            }
            Ok(false) => false,
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!("host key for {}:{} has changed", self.host, self.port);
                false
            }
            // Unreadable known_hosts: only TOFU proceeds.
            Err(_) => self.policy == HostKeyPolicy::TrustOnFirstUse,
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = self.verdict(server_public_key);
        if !accepted {
            self.rejected.store(true, Ordering::SeqCst);
        }
        Ok(accepted)
    }
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Arc<Handle<SshHandler>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Session {
    /// Connect to the remote host and authenticate with `credential`.
    pub async fn connect(config: SessionConfig, credential: &Credential) -> Result<Self> {
        let auth_method = credential.resolve()?;

        let russh_config = Config {
            inactivity_timeout: config.inactivity_timeout,
            keepalive_interval: config.keepalive_interval,
            ..Default::default()
        };

        let rejected = Arc::new(AtomicBool::new(false));
        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            policy: config.host_key_policy,
            known_hosts_path: config.known_hosts_path.clone(),
            rejected: Arc::clone(&rejected),
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| {
            if rejected.load(Ordering::SeqCst) {
                Error::HostKeyRejected {
                    host: config.host.clone(),
                    port: config.port,
                }
            } else if e.to_string().contains("Connection refused") {
                Error::Connection(format!(
                    "connection refused to {}:{}",
                    config.host, config.port
                ))
            } else {
                Error::Connection(e.to_string())
            }
        })?;

        Self::authenticate(&mut handle, &config.user, auth_method).await?;

        tracing::info!(host = %config.host, port = config.port, user = %config.user, "session connected");

        Ok(Self {
            config,
            handle: Arc::new(handle),
            closed: AtomicBool::new(false),
        })
    }

    async fn authenticate(
        handle: &mut Handle<SshHandler>,
        user: &str,
        auth_method: AuthMethod,
    ) -> Result<()> {
        let (method, result) = match auth_method {
            AuthMethod::None => ("none", handle.authenticate_none(user).await?),
            AuthMethod::Password(password) => (
                "password",
                handle.authenticate_password(user, password).await?,
            ),
            AuthMethod::PublicKey(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                (
                    "publickey",
                    handle
                        .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                        .await?,
                )
            }
        };

        if result.success() {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed(format!(
                "{} authentication rejected for user {}",
                method, user
            )))
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the session can still open channels.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.handle.is_closed()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Execute a command on the remote host, bounded by the configured command timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        match self.config.command_timeout {
            Some(timeout) => self.exec_with_timeout(command, timeout).await,
            None => self.exec_inner(command).await,
        }
    }

    /// Execute a command with a custom timeout.
    pub async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        match tokio::time::timeout(timeout, self.exec_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(timeout)),
        }
    }

    async fn exec_inner(&self, command: &str) -> Result<CommandOutput> {
        self.ensure_connected()?;

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Channel(format!("failed to exec command: {}", e)))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Failure) => {
                    return Err(Error::Channel(
                        "server refused exec request".to_string(),
                    ));
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        // A stream that ends without EOF or close was cut by the transport.
        if !got_eof && exit_code.is_none() && !self.is_connected() {
            return Err(Error::Channel(
                "connection lost while reading command output".to_string(),
            ));
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Open an interactive shell channel with a pseudo-terminal of type `term`.
    pub async fn open_shell(&self, term: &str, size: ShellSize) -> Result<ShellChannel> {
        self.ensure_connected()?;
        shell::open(&self.handle, term, size).await
    }

    /// Bind `local_port` on loopback (0 picks a free port) and tunnel every
    /// accepted connection to `remote_host:remote_port`.
    pub async fn forward_local(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<ForwardHandle> {
        self.ensure_connected()?;
        forward::start_forward(
            Arc::clone(&self.handle),
            local_port,
            remote_host.to_string(),
            remote_port,
        )
        .await
    }

    /// Disconnect the session. Channels still open observe the closed connection.
    pub async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        tracing::info!(host = %self.config.host, port = self.config.port, "session disconnected");
        Ok(())
    }
}
