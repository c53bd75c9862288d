// ABOUTME: Single-subscriber delivery of shell output events.
// ABOUTME: All producers feed one queue drained by one task, so events arrive in production order.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Kind of event on the outbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventName {
    /// One line of shell output.
    Shell,
    /// The shell ended: remote end-of-stream or an explicit close.
    ShellClosed,
    /// The shell's read loop failed; `value` carries the error message.
    ShellError,
}

/// Event record pushed to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellEvent {
    pub name: EventName,
    pub key: String,
    pub value: String,
}

impl ShellEvent {
    /// A line of output; the value is the line followed by `\n`.
    pub fn output(key: &str, line: &str) -> Self {
        Self {
            name: EventName::Shell,
            key: key.to_string(),
            value: format!("{}\n", line),
        }
    }

    pub fn closed(key: &str) -> Self {
        Self {
            name: EventName::ShellClosed,
            key: key.to_string(),
            value: String::new(),
        }
    }

    pub fn error(key: &str, message: impl Into<String>) -> Self {
        Self {
            name: EventName::ShellError,
            key: key.to_string(),
            value: message.into(),
        }
    }
}

/// Receiver of shell events. Called from the dispatcher's delivery task only.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: ShellEvent);
}

/// Sink forwarding events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<ShellEvent>);

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ShellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: ShellEvent) {
        if self.0.send(event).is_err() {
            tracing::trace!("event subscriber receiver dropped");
        }
    }
}

/// Sink wrapping a closure.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(ShellEvent) + Send + Sync + 'static,
{
    fn deliver(&self, event: ShellEvent) {
        (self.0)(event)
    }
}

type Subscriber = Arc<Mutex<Option<Arc<dyn EventSink>>>>;

/// The single outbound path for shell events.
///
/// Events emitted while nobody listens are dropped, not queued.
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<ShellEvent>,
    subscriber: Subscriber,
}

impl EventDispatcher {
    /// Create the dispatcher and spawn its delivery task on the current runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber: Subscriber = Arc::new(Mutex::new(None));
        tokio::spawn(deliver(rx, Arc::clone(&subscriber)));
        Self { tx, subscriber }
    }

    /// Install `sink` as the subscriber, replacing any previous one.
    pub fn listen(&self, sink: impl EventSink) {
        *self.subscriber.lock() = Some(Arc::new(sink));
        tracing::debug!("event subscriber installed");
    }

    /// Remove the subscriber. Events still queued are dropped.
    pub fn cancel(&self) {
        if self.subscriber.lock().take().is_some() {
            tracing::debug!("event subscriber cancelled");
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.lock().is_some()
    }

    /// Hand an event to the delivery task.
    pub fn emit(&self, event: ShellEvent) {
        if !self.has_subscriber() {
            tracing::trace!(key = %event.key, "no subscriber; dropping event");
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::trace!("event delivery task stopped");
        }
    }
}

async fn deliver(mut rx: mpsc::UnboundedReceiver<ShellEvent>, subscriber: Subscriber) {
    while let Some(event) = rx.recv().await {
        // Clone out so the sink runs without the lock held.
        let sink = subscriber.lock().clone();
        match sink {
            Some(sink) => sink.deliver(event),
            None => tracing::trace!(key = %event.key, "subscriber gone; dropping event"),
        }
    }
}
