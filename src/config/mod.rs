// ABOUTME: Configuration types and parsing for sshpool.yml.
// ABOUTME: Handles YAML parsing, file discovery and conversion into pool settings.

mod host;
mod init;
mod secret;

pub use host::{HostAddress, HostProfile};
pub use init::init_config;
pub use secret::SecretValue;

use crate::error::{Error, Result};
use crate::pool::{PoolSettings, ReconnectPolicy};
use crate::ssh::{Credential, HostKeyPolicy, ShellSize};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "sshpool.yml";
pub const CONFIG_FILENAME_ALT: &str = "sshpool.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sshpool/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host_key: HostKeyPolicy,

    pub known_hosts_path: Option<PathBuf>,

    #[serde(with = "humantime_serde")]
    pub inactivity_timeout: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub keepalive_interval: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub command_timeout: Option<Duration>,

    pub pty: ShellSize,

    pub on_reconnect: ReconnectPolicy,

    pub hosts: HashMap<String, HostProfile>,
}

/// A connection target resolved from a profile name or a literal address.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: HostAddress,
    pub profile: Option<HostProfile>,
}

impl Target {
    /// The profile's credential, or `fallback` when the target has no profile.
    pub fn credential(&self, fallback: Option<Credential>) -> Result<Credential> {
        match (&self.profile, fallback) {
            (_, Some(credential)) => Ok(credential),
            (Some(profile), None) => profile.credential(),
            (None, None) => Err(Error::MissingCredential(self.address.host.clone())),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like `discover`, but a missing file yields the defaults.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            host_key_policy: self.host_key,
            known_hosts_path: self.known_hosts_path.clone(),
            inactivity_timeout: self.inactivity_timeout,
            keepalive_interval: self.keepalive_interval,
            command_timeout: self.command_timeout,
            shell_size: self.pty,
            on_reconnect: self.on_reconnect,
        }
    }

    /// Resolve a profile name, falling back to parsing `[user@]host[:port]`.
    pub fn target(&self, name_or_address: &str) -> Result<Target> {
        if let Some(profile) = self.hosts.get(name_or_address) {
            return Ok(Target {
                address: profile.address.clone(),
                profile: Some(profile.clone()),
            });
        }
        Ok(Target {
            address: HostAddress::parse(name_or_address)?,
            profile: None,
        })
    }
}
