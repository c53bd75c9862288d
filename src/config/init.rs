// ABOUTME: Config scaffolding.
// ABOUTME: Writes a commented sshpool.yml template.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    tracing::debug!(path = %config_path.display(), "wrote config template");
    Ok(())
}

const TEMPLATE: &str = r#"# Host key verification: accept_any | trust_on_first_use | strict
# accept_any does not verify the server at all.
host_key: accept_any
# known_hosts_path: ~/.ssh/known_hosts

# inactivity_timeout: 10m
# keepalive_interval: 30s
# command_timeout: 5m

pty:
  columns: 80
  rows: 24

# What connect does when the client key is already in use: close_previous | reject
on_reconnect: close_previous

hosts:
  example:
    address: deploy@server.example.com:22
    password:
      env: SSHPOOL_PASSWORD
    # key_path: ~/.ssh/id_ed25519
    # passphrase:
    #   env: SSHPOOL_PASSPHRASE
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn template_parses() {
        let config = Config::from_yaml(TEMPLATE).unwrap();
        assert!(config.hosts.contains_key("example"));
        assert_eq!(config.pty.columns, 80);
    }
}
