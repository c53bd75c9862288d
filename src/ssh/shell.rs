// ABOUTME: Interactive shell channels with a pseudo-terminal.
// ABOUTME: Splits the channel into an owned reader and writer.

use super::client::SshHandler;
use super::error::{Error, Result};
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, ChannelStream};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, WriteHalf};

/// Terminal dimensions requested with the pty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShellSize {
    pub columns: u32,
    pub rows: u32,
}

impl Default for ShellSize {
    fn default() -> Self {
        Self {
            columns: 80,
            rows: 24,
        }
    }
}

/// An open shell: both halves are created together and handed out together.
pub struct ShellChannel {
    pub reader: ShellReader,
    pub writer: ShellWriter,
}

/// Read side of a shell channel.
pub struct ShellReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl ShellReader {
    pub(crate) fn new(inner: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// Read the next chunk of output. `Ok(0)` means the remote side closed.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf).await
    }
}

/// Write side of a shell channel.
pub struct ShellWriter {
    inner: WriteHalf<ChannelStream<Msg>>,
}

impl ShellWriter {
    /// Write raw bytes (no terminator is added) and flush.
    pub async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }

    /// Flush pending input and send EOF on the channel.
    pub async fn close(&mut self) -> std::io::Result<()> {
        self.inner.flush().await?;
        self.inner.shutdown().await
    }
}

pub(crate) async fn open(
    handle: &Handle<SshHandler>,
    term: &str,
    size: ShellSize,
) -> Result<ShellChannel> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| Error::Channel(format!("failed to open shell channel: {}", e)))?;

    channel
        .request_pty(true, term, size.columns, size.rows, 0, 0, &[])
        .await
        .map_err(|e| Error::Channel(format!("failed to request pty {}: {}", term, e)))?;
    await_reply(&mut channel, "pty").await?;

    channel
        .request_shell(true)
        .await
        .map_err(|e| Error::Channel(format!("failed to request shell: {}", e)))?;
    await_reply(&mut channel, "shell").await?;

    tracing::debug!(channel = ?channel.id(), term, "shell channel opened");

    let (reader, writer) = tokio::io::split(channel.into_stream());
    Ok(ShellChannel {
        reader: ShellReader::new(reader),
        writer: ShellWriter { inner: writer },
    })
}

/// Wait for the server's answer to a `want_reply` channel request.
async fn await_reply(channel: &mut Channel<Msg>, request: &str) -> Result<()> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(Error::Channel(format!(
                    "server refused {} request",
                    request
                )));
            }
            Some(ChannelMsg::Close) | None => {
                return Err(Error::Channel(format!(
                    "channel closed before {} request was answered",
                    request
                )));
            }
            Some(other) => {
                tracing::trace!(request, message = ?other, "ignoring channel message while awaiting reply");
            }
        }
    }
}
