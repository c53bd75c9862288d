// ABOUTME: Authentication inputs accepted by connect.
// ABOUTME: Normalizes a password or an in-memory key pair into a transport auth method.

use super::error::{Error, Result};
use russh::keys::{PrivateKey, decode_secret_key};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Secret used to authenticate a new session.
///
/// On the wire this is either a bare string (a password) or a map carrying
/// `privateKey` and optionally `publicKey` and `passphrase`.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum Credential {
    Password(String),
    KeyPair(KeyPair),
}

/// Raw key material supplied by the caller. Nothing is parsed until connect.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    #[serde(with = "text_bytes")]
    pub private_key: Vec<u8>,
    #[serde(default, with = "text_bytes_opt")]
    pub public_key: Option<Vec<u8>>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Credential::Password(password.into())
    }

    pub fn key_pair(private_key: impl Into<Vec<u8>>) -> Self {
        Credential::KeyPair(KeyPair {
            private_key: private_key.into(),
            public_key: None,
            passphrase: None,
        })
    }

    /// Attach a passphrase. No-op for password credentials.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        if let Credential::KeyPair(pair) = &mut self {
            pair.passphrase = Some(passphrase.into());
        }
        self
    }

    /// Attach the public half. No-op for password credentials.
    pub fn with_public_key(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        if let Credential::KeyPair(pair) = &mut self {
            pair.public_key = Some(public_key.into());
        }
        self
    }

    /// Turn the credential into something the transport can authenticate with.
    ///
    /// Key material is decoded here, so a malformed key fails the connect that
    /// resolved it rather than the call that supplied it.
    pub(crate) fn resolve(&self) -> Result<AuthMethod> {
        match self {
            Credential::Password(password) if password.is_empty() => Ok(AuthMethod::None),
            Credential::Password(password) => Ok(AuthMethod::Password(password.clone())),
            Credential::KeyPair(pair) => {
                if pair.private_key.is_empty() {
                    return Err(Error::KeyDecode("private key is required".to_string()));
                }
                let pem = std::str::from_utf8(&pair.private_key)
                    .map_err(|e| Error::KeyDecode(format!("private key is not UTF-8: {}", e)))?;
                if pair.public_key.is_some() {
                    tracing::debug!("public key supplied; the key derived from the private key is used");
                }
                let key = decode_secret_key(pem, pair.passphrase.as_deref())
                    .map_err(|e| Error::KeyDecode(e.to_string()))?;
                Ok(AuthMethod::PublicKey(Arc::new(key)))
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::KeyPair(pair) => f
                .debug_struct("KeyPair")
                .field("private_key", &"<redacted>")
                .field("public_key", &pair.public_key.as_ref().map(|_| "<set>"))
                .field("passphrase", &pair.passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Authentication method resolved from a credential.
pub(crate) enum AuthMethod {
    /// Empty password: try the `none` method.
    None,
    Password(String),
    PublicKey(Arc<PrivateKey>),
}

/// Key material arrives as text on the wire but is held as bytes.
mod text_bytes {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(String::into_bytes)
    }
}

mod text_bytes_opt {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(|s| s.map(String::into_bytes))
    }
}
