// ABOUTME: Exec command implementation.
// ABOUTME: Connects, runs a single command and prints its normalized stdout.

use super::{CLI_KEY, connect_target};
use sshpool::config::Config;
use sshpool::error::Result;
use sshpool::pool::SshPool;
use std::io::Write;

/// Run `command` on `host` and write its output to stdout.
pub async fn exec_command(
    config: Config,
    host: String,
    command: Vec<String>,
    password: Option<String>,
) -> Result<()> {
    let pool = SshPool::new(config.pool_settings());
    connect_target(&pool, &config, &host, password).await?;

    let result = pool.execute(CLI_KEY, &command.join(" ")).await;
    pool.close_all().await;

    let output = result?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
