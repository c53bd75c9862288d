// ABOUTME: Named host profiles for the command-line front end.
// ABOUTME: Parses addresses like "host", "user@host", "host:port", "user@host:port".

use super::secret::SecretValue;
use crate::error::{Error, Result};
use crate::ssh::Credential;
use serde::Deserialize;
use std::path::PathBuf;

/// Where to connect and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
}

impl HostAddress {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress(
                "host address cannot be empty".to_string(),
            ));
        }

        // Parse format: [user@]host[:port]
        let (user_part, rest) = match s.rsplit_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidAddress(format!("invalid port: {}", port_str)))?;
                (host, port)
            }
            None => (rest, 22),
        };

        if host.is_empty() {
            return Err(Error::InvalidAddress("hostname cannot be empty".to_string()));
        }
        if user_part.is_some_and(str::is_empty) {
            return Err(Error::InvalidAddress("username cannot be empty".to_string()));
        }

        Ok(HostAddress {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
        })
    }

    /// Explicit user, else $USER, else root.
    pub fn user_or_default(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }
}

impl<'de> Deserialize<'de> for HostAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HostAddress::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostProfile {
    pub address: HostAddress,
    #[serde(default)]
    pub password: Option<SecretValue>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<SecretValue>,
}

impl HostProfile {
    /// Build the credential for this profile. A key file wins over a password.
    pub fn credential(&self) -> Result<Credential> {
        if let Some(path) = &self.key_path {
            let key = std::fs::read(path)?;
            let mut credential = Credential::key_pair(key);
            if let Some(passphrase) = &self.passphrase {
                credential = credential.with_passphrase(passphrase.resolve()?);
            }
            return Ok(credential);
        }

        match &self.password {
            Some(password) => Ok(Credential::password(password.resolve()?)),
            None => Err(Error::MissingCredential(self.address.host.clone())),
        }
    }
}
