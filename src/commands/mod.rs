// ABOUTME: Command module aggregator for the sshpool CLI.
// ABOUTME: Re-exports serve, exec and forward command handlers.

mod exec;
mod forward;
mod serve;

pub use exec::exec_command;
pub use forward::forward_command;
pub use serve::serve;

use sshpool::config::Config;
use sshpool::error::Result;
use sshpool::pool::SshPool;
use sshpool::ssh::Credential;

/// Client key used by the one-shot subcommands.
const CLI_KEY: &str = "cli";

/// Resolve `host` against the config and connect it into `pool` under [`CLI_KEY`].
async fn connect_target(
    pool: &SshPool,
    config: &Config,
    host: &str,
    password: Option<String>,
) -> Result<()> {
    let target = config.target(host)?;
    let credential = target.credential(password.map(Credential::password))?;
    let address = &target.address;

    tracing::debug!(host = %address.host, port = address.port, "connecting");
    pool.connect(
        CLI_KEY,
        &address.host,
        address.port,
        &address.user_or_default(),
        &credential,
    )
    .await?;
    Ok(())
}
