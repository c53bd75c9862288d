// ABOUTME: Local TCP port forwarding over SSH.
// ABOUTME: Binds a loopback listener and tunnels each connection through a direct-tcpip channel.

use super::client::SshHandler;
use super::error::{Error, Result};
use russh::client::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle for managing a local forward.
#[derive(Debug)]
pub struct ForwardHandle {
    local_port: u16,
    remote_host: String,
    remote_port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ForwardHandle {
    /// Port actually bound on the loopback interface.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote(&self) -> (&str, u16) {
        (&self.remote_host, self.remote_port)
    }

    /// Stop accepting connections and release the local port.
    /// Tunnels already established run until either side closes.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            // Wait for the listener to be dropped (with timeout)
            let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
        }
    }
}

impl Drop for ForwardHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind `127.0.0.1:local_port` and forward every accepted connection to
/// `remote_host:remote_port` on the far side of the session.
pub async fn start_forward(
    handle: Arc<Handle<SshHandler>>,
    local_port: u16,
    remote_host: String,
    remote_port: u16,
) -> Result<ForwardHandle> {
    let listener = TcpListener::bind(("127.0.0.1", local_port))
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::ForwardFailed(format!("local port {} is already in use", local_port))
            } else {
                Error::ForwardFailed(format!("failed to bind local port {}: {}", local_port, e))
            }
        })?;

    let bound_port = listener.local_addr()?.port();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(run_forwarder(
        listener,
        handle,
        remote_host.clone(),
        remote_port,
        shutdown_rx,
    ));

    tracing::info!(
        "Forwarding localhost:{} -> {}:{}",
        bound_port,
        remote_host,
        remote_port
    );

    Ok(ForwardHandle {
        local_port: bound_port,
        remote_host,
        remote_port,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

/// Accept connections until shut down.
async fn run_forwarder(
    listener: TcpListener,
    handle: Arc<Handle<SshHandler>>,
    remote_host: String,
    remote_port: u16,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let handle = Arc::clone(&handle);
                    let remote_host = remote_host.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            forward_connection(stream, peer, &handle, &remote_host, remote_port).await
                        {
                            tracing::debug!("Forward connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error on forwarded port: {}", e);
                    break;
                }
            },
            _ = &mut shutdown_rx => {
                tracing::debug!("Shutting down forward to {}:{}", remote_host, remote_port);
                break;
            }
        }
    }
}

/// Forward a single connection through SSH.
async fn forward_connection(
    mut local_stream: TcpStream,
    peer: SocketAddr,
    handle: &Handle<SshHandler>,
    remote_host: &str,
    remote_port: u16,
) -> Result<()> {
    let channel = handle
        .channel_open_direct_tcpip(
            remote_host,
            u32::from(remote_port),
            peer.ip().to_string(),
            u32::from(peer.port()),
        )
        .await
        .map_err(|e| {
            Error::ForwardFailed(format!(
                "failed to open direct-tcpip channel to {}:{}: {}",
                remote_host, remote_port, e
            ))
        })?;

    let mut channel_stream = channel.into_stream();
    let (sent, received) =
        tokio::io::copy_bidirectional(&mut local_stream, &mut channel_stream).await?;
    tracing::debug!(%peer, sent, received, "forwarded connection closed");

    Ok(())
}
