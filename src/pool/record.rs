// ABOUTME: One pooled SSH connection plus its optional shell and forwards.
// ABOUTME: Shell writer and read-loop stop signal live in one slot, present or absent together.

use crate::ssh::{ForwardHandle, Session, ShellWriter};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

static NEXT_SHELL: AtomicU64 = AtomicU64::new(1);

/// Shell sub-resources of a record.
pub(crate) struct ActiveShell {
    generation: u64,
    writer: Arc<tokio::sync::Mutex<ShellWriter>>,
    stop_tx: oneshot::Sender<()>,
}

impl ActiveShell {
    /// Stop the read loop, then flush and close the channel's input.
    pub(crate) async fn shutdown(self, key: &str) {
        let _ = self.stop_tx.send(());
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!(key = %key, "error closing shell writer: {}", e);
        }
        tracing::debug!(key = %key, generation = self.generation, "shell closed");
    }
}

pub struct ClientRecord {
    key: String,
    session: Session,
    shell: Mutex<Option<ActiveShell>>,
    forwards: Mutex<Vec<ForwardHandle>>,
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("key", &self.key)
            .field("session", &self.session)
            .field("shell_active", &self.has_shell())
            .field("forwards", &self.forward_ports())
            .finish()
    }
}

impl ClientRecord {
    pub fn new(key: impl Into<String>, session: Session) -> Self {
        Self {
            key: key.into(),
            session,
            shell: Mutex::new(None),
            forwards: Mutex::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn has_shell(&self) -> bool {
        self.shell.lock().is_some()
    }

    /// Store a freshly opened shell and return its generation plus whatever
    /// shell it displaced.
    pub(crate) fn install_shell(
        &self,
        writer: ShellWriter,
        stop_tx: oneshot::Sender<()>,
    ) -> (u64, Option<ActiveShell>) {
        let generation = NEXT_SHELL.fetch_add(1, Ordering::Relaxed);
        let shell = ActiveShell {
            generation,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            stop_tx,
        };
        let previous = self.shell.lock().replace(shell);
        (generation, previous)
    }

    pub(crate) fn take_shell(&self) -> Option<ActiveShell> {
        self.shell.lock().take()
    }

    /// Drop the shell slot if it still belongs to `generation`.
    pub(crate) fn release_shell(&self, generation: u64) -> bool {
        let mut slot = self.shell.lock();
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn shell_writer(&self) -> Option<Arc<tokio::sync::Mutex<ShellWriter>>> {
        self.shell.lock().as_ref().map(|s| Arc::clone(&s.writer))
    }

    pub(crate) fn add_forward(&self, forward: ForwardHandle) {
        self.forwards.lock().push(forward);
    }

    pub fn forward_ports(&self) -> Vec<u16> {
        self.forwards
            .lock()
            .iter()
            .map(ForwardHandle::local_port)
            .collect()
    }

    pub(crate) async fn close_shell(&self) -> bool {
        match self.take_shell() {
            Some(shell) => {
                shell.shutdown(&self.key).await;
                true
            }
            None => false,
        }
    }

    pub(crate) async fn stop_forwards(&self) {
        // Drain to Vec to release lock before await
        let forwards: Vec<_> = self.forwards.lock().drain(..).collect();
        for forward in forwards {
            forward.stop().await;
        }
    }

    /// Release everything the record owns: shell, forwards, then the session.
    pub(crate) async fn teardown(&self) {
        self.close_shell().await;
        self.stop_forwards().await;
        if let Err(e) = self.session.disconnect().await {
            tracing::warn!(key = %self.key, "failed to disconnect session: {}", e);
        }
    }
}
