// ABOUTME: JSON-lines request server over stdin/stdout.
// ABOUTME: Each request runs on its own task; a single writer task serializes replies and events.

use sshpool::dispatch::{Dispatcher, OutboundFrame, Reply, Request, RequestFrame};
use sshpool::error::Result;
use sshpool::events::FnSink;
use sshpool::pool::SshPool;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Serve requests from stdin until end-of-input, then close every client.
pub async fn serve(pool: SshPool) -> Result<()> {
    let pool = Arc::new(pool);
    let (out_tx, out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let writer = tokio::spawn(write_frames(out_rx));

    let events_tx = out_tx.clone();
    let dispatcher = Dispatcher::new(Arc::clone(&pool)).with_subscriber(FnSink(move |event| {
        let _ = events_tx.send(OutboundFrame::Event { event });
    }));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        reap(&mut in_flight);
        if line.trim().is_empty() {
            continue;
        }
        let frame: RequestFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("discarding malformed request: {}", e);
                continue;
            }
        };
        tracing::debug!(seq = frame.seq, method = %frame.method, "request");

        let seq = frame.seq;
        let request = match Request::parse(&frame.method, frame.args) {
            Ok(request) => request,
            Err(reply) => {
                send_reply(&out_tx, seq, reply);
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        let out_tx = out_tx.clone();
        in_flight.spawn(async move {
            // The reply is queued before a started shell's first output event.
            dispatcher
                .handle_with(request, |reply| {
                    if let Some(reply) = reply {
                        send_reply(&out_tx, seq, reply);
                    }
                })
                .await;
        });
    }

    tracing::debug!(requests = in_flight.len(), "stdin closed; draining");
    while let Some(result) = in_flight.join_next().await {
        log_join_failure(result);
    }
    pool.close_all().await;
    pool.events().cancel();

    drop(dispatcher);
    drop(out_tx);
    writer.await.map_err(std::io::Error::other)??;
    Ok(())
}

/// Collect requests that already finished so the set only holds live ones.
fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(result) = in_flight.try_join_next() {
        log_join_failure(result);
    }
}

fn log_join_failure(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("request task failed: {}", e);
    }
}

fn send_reply(out_tx: &mpsc::UnboundedSender<OutboundFrame>, seq: u64, reply: Reply) {
    if out_tx.send(OutboundFrame::Reply { seq, reply }).is_err() {
        tracing::warn!(seq, "output closed; reply dropped");
    }
}

async fn write_frames(mut rx: mpsc::UnboundedReceiver<OutboundFrame>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(frame) = rx.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}
