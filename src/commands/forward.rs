// ABOUTME: Forward command implementation.
// ABOUTME: Holds a local port forward open until Ctrl-C.

use super::{CLI_KEY, connect_target};
use sshpool::config::Config;
use sshpool::error::Result;
use sshpool::pool::SshPool;

pub async fn forward_command(
    config: Config,
    host: String,
    lport: u16,
    rhost: String,
    rport: u16,
    password: Option<String>,
) -> Result<()> {
    let pool = SshPool::new(config.pool_settings());
    connect_target(&pool, &config, &host, password).await?;

    let port = match pool.forward_local(CLI_KEY, lport, &rhost, rport).await {
        Ok(port) => port,
        Err(e) => {
            pool.close_all().await;
            return Err(e.into());
        }
    };
    println!("Forwarding 127.0.0.1:{} -> {}:{}", port, rhost, rport);

    tokio::signal::ctrl_c().await?;
    tracing::debug!("interrupted; closing forward");
    pool.close_all().await;
    Ok(())
}
