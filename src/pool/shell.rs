// ABOUTME: Background read loop for an interactive shell.
// ABOUTME: Turns channel output into line events and reports how the stream ended.

use super::record::ClientRecord;
use crate::events::{EventDispatcher, ShellEvent};
use crate::ssh::ShellReader;
use crate::ssh::lines::LineSplitter;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

const READ_BUFFER: usize = 8192;

enum Ending {
    EndOfStream,
    Stopped,
    Failed(std::io::Error),
}

/// Identity of one shell's read loop and where its events go.
pub(crate) struct ReadLoop {
    pub key: String,
    pub record: Weak<ClientRecord>,
    pub generation: u64,
    pub events: Arc<EventDispatcher>,
}

/// Read until the remote closes, the loop is stopped, or a read fails.
///
/// Nothing is read before `go` fires or its sender is dropped. Runs
/// detached from the call that started the shell, so failures are
/// reported as a terminal event rather than returned.
pub(crate) async fn read_loop(
    shell: ReadLoop,
    mut reader: ShellReader,
    go: oneshot::Receiver<()>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let ReadLoop {
        key,
        record,
        generation,
        events,
    } = shell;
    let mut splitter = LineSplitter::new();

    let stopped_early = tokio::select! {
        biased;
        _ = &mut stop_rx => true,
        _ = go => false,
    };

    let ending = if stopped_early {
        Ending::Stopped
    } else {
        pump(&key, &mut reader, &mut splitter, &mut stop_rx, &events).await
    };

    match ending {
        Ending::EndOfStream => {
            if let Some(line) = splitter.finish() {
                events.emit(ShellEvent::output(&key, &line));
            }
            tracing::debug!(key = %key, "shell reached end of stream");
            events.emit(ShellEvent::closed(&key));
        }
        Ending::Stopped => {
            tracing::debug!(key = %key, "shell read loop stopped");
            events.emit(ShellEvent::closed(&key));
        }
        Ending::Failed(e) => {
            tracing::warn!(key = %key, "shell read failed: {}", e);
            events.emit(ShellEvent::error(&key, e.to_string()));
        }
    }

    if let Some(record) = record.upgrade() {
        record.release_shell(generation);
    }
}

async fn pump(
    key: &str,
    reader: &mut ShellReader,
    splitter: &mut LineSplitter,
    stop_rx: &mut oneshot::Receiver<()>,
    events: &EventDispatcher,
) -> Ending {
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        tokio::select! {
            biased;
            // A dropped sender means the record itself went away.
            _ = &mut *stop_rx => return Ending::Stopped,
            result = reader.read_chunk(&mut buf) => match result {
                Ok(0) => return Ending::EndOfStream,
                Ok(n) => {
                    for line in splitter.push(&buf[..n]) {
                        events.emit(ShellEvent::output(key, &line));
                    }
                }
                Err(e) => return Ending::Failed(e),
            },
        }
    }
}
