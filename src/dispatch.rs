// ABOUTME: Keyed request/reply surface over the pool.
// ABOUTME: Parses method calls, runs each on its own task and shapes results into wire replies.

use crate::events::{EventSink, ShellEvent};
use crate::pool::{ErrorCode, ShellStart, SshPool};
use crate::ssh::Credential;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One call against the pool, addressed by client key (`id`).
#[derive(Debug, Clone)]
pub enum Request {
    Connect {
        id: String,
        host: String,
        port: u16,
        username: String,
        credential: Credential,
    },
    Execute {
        id: String,
        cmd: String,
    },
    PortForwardL {
        id: String,
        rhost: String,
        rport: u16,
        lport: u16,
    },
    StartShell {
        id: String,
        pty_type: String,
    },
    WriteToShell {
        id: String,
        cmd: String,
    },
    /// A missing or malformed `id` closes nothing.
    CloseShell {
        id: Option<String>,
    },
    /// A missing or malformed `id` is simply not connected.
    IsConnected {
        id: Option<String>,
    },
    Disconnect {
        id: String,
    },
    /// Subscribe to shell events.
    Listen,
    /// Drop the event subscription.
    Cancel,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectArgs {
    #[serde(deserialize_with = "key_string")]
    id: String,
    host: String,
    #[serde(deserialize_with = "number_or_string")]
    port: u16,
    username: String,
    password_or_key: Credential,
}

#[derive(Deserialize)]
struct CmdArgs {
    #[serde(deserialize_with = "key_string")]
    id: String,
    cmd: String,
}

#[derive(Deserialize)]
struct ForwardArgs {
    #[serde(deserialize_with = "key_string")]
    id: String,
    rhost: String,
    #[serde(deserialize_with = "number_or_string")]
    rport: u16,
    #[serde(deserialize_with = "number_or_string")]
    lport: u16,
}

#[derive(Deserialize)]
struct DisconnectArgs {
    #[serde(deserialize_with = "key_string")]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShellArgs {
    #[serde(deserialize_with = "key_string")]
    id: String,
    pty_type: String,
}

/// Client keys arrive as strings or numbers; numbers are used in their decimal form.
fn key_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid client id: {}",
            other
        ))),
    }
}

/// The `id` of an argument map, if it is a string or a number.
fn lenient_key(args: &Value) -> Option<String> {
    match args.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Ports arrive as numbers or as numeric strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
    }
}

impl Request {
    /// Build a request from a method name and its argument map.
    ///
    /// An unknown method yields a `not_implemented` reply; malformed
    /// arguments yield the method's own failure code.
    pub fn parse(method: &str, args: Value) -> Result<Self, Reply> {
        fn args_for<T: serde::de::DeserializeOwned>(
            args: Value,
            code: ErrorCode,
        ) -> Result<T, Reply> {
            serde_json::from_value(args)
                .map_err(|e| Reply::error(code, format!("invalid arguments: {}", e)))
        }

        let request = match method {
            "connectToHost" | "connect" => {
                let a: ConnectArgs = args_for(args, ErrorCode::ConnectionFailure)?;
                Request::Connect {
                    id: a.id,
                    host: a.host,
                    port: a.port,
                    username: a.username,
                    credential: a.password_or_key,
                }
            }
            "execute" => {
                let a: CmdArgs = args_for(args, ErrorCode::ExecuteFailure)?;
                Request::Execute { id: a.id, cmd: a.cmd }
            }
            "portForwardL" => {
                let a: ForwardArgs = args_for(args, ErrorCode::PortForwardFailure)?;
                Request::PortForwardL {
                    id: a.id,
                    rhost: a.rhost,
                    rport: a.rport,
                    lport: a.lport,
                }
            }
            "startShell" => {
                let a: ShellArgs = args_for(args, ErrorCode::ShellFailure)?;
                Request::StartShell {
                    id: a.id,
                    pty_type: a.pty_type,
                }
            }
            "writeToShell" => {
                let a: CmdArgs = args_for(args, ErrorCode::WriteFailure)?;
                Request::WriteToShell { id: a.id, cmd: a.cmd }
            }
            "closeShell" => Request::CloseShell {
                id: lenient_key(&args),
            },
            "isConnected" => Request::IsConnected {
                id: lenient_key(&args),
            },
            "disconnect" => {
                let a: DisconnectArgs = args_for(args, ErrorCode::ExecuteFailure)?;
                Request::Disconnect { id: a.id }
            }
            "listen" => Request::Listen,
            "cancel" => Request::Cancel,
            other => {
                return Err(Reply::error(
                    ErrorCode::NotImplemented,
                    format!("unknown method: {}", other),
                ));
            }
        };
        Ok(request)
    }
}

/// Outcome of a request as it appears on the wire:
/// `{"result": "..."}` or `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Result(String),
    Error { code: ErrorCode, message: String },
}

impl Reply {
    pub fn ok(value: impl Into<String>) -> Self {
        Reply::Result(value.into())
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Result(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Reply::Result(value) => Some(value),
            Reply::Error { .. } => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Reply::Result(_) => None,
            Reply::Error { code, .. } => Some(*code),
        }
    }
}

impl From<crate::pool::ClientError> for Reply {
    fn from(e: crate::pool::ClientError) -> Self {
        Reply::error(e.code(), e.to_string())
    }
}

/// Inbound frame: a request tagged with the caller's sequence number.
#[derive(Debug, Deserialize)]
pub struct RequestFrame {
    pub seq: u64,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

/// Outbound frame: either the reply to a request or a shell event.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Reply {
        seq: u64,
        #[serde(flatten)]
        reply: Reply,
    },
    Event {
        event: ShellEvent,
    },
}

struct SharedSink(Arc<dyn EventSink>);

impl EventSink for SharedSink {
    fn deliver(&self, event: ShellEvent) {
        self.0.deliver(event)
    }
}

/// Routes requests to the pool. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<SshPool>,
    subscriber: Option<Arc<dyn EventSink>>,
}

impl Dispatcher {
    pub fn new(pool: Arc<SshPool>) -> Self {
        Self {
            pool,
            subscriber: None,
        }
    }

    /// Sink installed when a `listen` request arrives.
    pub fn with_subscriber(mut self, sink: impl EventSink) -> Self {
        self.subscriber = Some(Arc::new(sink));
        self
    }

    pub fn pool(&self) -> &Arc<SshPool> {
        &self.pool
    }

    /// Run `request` on its own task so the caller never waits on I/O.
    pub fn submit(&self, request: Request) -> JoinHandle<Option<Reply>> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.handle(request).await })
    }

    /// Run `request` to completion. `closeShell` has no reply.
    pub async fn handle(&self, request: Request) -> Option<Reply> {
        let (reply, _start) = self.run(request).await;
        reply
    }

    /// Run `request` and pass its reply to `respond`. A started shell emits
    /// no output until `respond` has returned.
    pub async fn handle_with<F>(&self, request: Request, respond: F)
    where
        F: FnOnce(Option<Reply>),
    {
        let (reply, start) = self.run(request).await;
        respond(reply);
        drop(start);
    }

    async fn run(&self, request: Request) -> (Option<Reply>, Option<ShellStart>) {
        let pool = &self.pool;
        let reply = match request {
            Request::Connect {
                id,
                host,
                port,
                username,
                credential,
            } => pool
                .connect(&id, &host, port, &username, &credential)
                .await
                .map(|()| Reply::ok("session_connected")),
            Request::Execute { id, cmd } => pool.execute(&id, &cmd).await.map(Reply::Result),
            Request::PortForwardL {
                id,
                rhost,
                rport,
                lport,
            } => pool
                .forward_local(&id, lport, &rhost, rport)
                .await
                .map(|port| Reply::ok(port.to_string())),
            Request::StartShell { id, pty_type } => {
                return match pool.start_shell(&id, &pty_type).await {
                    Ok(start) => (Some(Reply::ok("shell_started")), Some(start)),
                    Err(e) => (Some(Reply::from(e)), None),
                };
            }
            Request::WriteToShell { id, cmd } => pool
                .write_to_shell(&id, &cmd)
                .await
                .map(|()| Reply::ok("write_success")),
            Request::CloseShell { id } => {
                if let Some(id) = id {
                    pool.close_shell(&id).await;
                }
                return (None, None);
            }
            Request::IsConnected { id } => {
                let connected = id.is_some_and(|id| pool.is_connected(&id));
                Ok(Reply::ok(connected.to_string()))
            }
            Request::Disconnect { id } => pool
                .disconnect(&id)
                .await
                .map(|()| Reply::ok("disconnected")),
            Request::Listen => Ok(match &self.subscriber {
                Some(sink) => {
                    pool.events().listen(SharedSink(Arc::clone(sink)));
                    Reply::ok("listening")
                }
                None => Reply::error(ErrorCode::NotImplemented, "no event subscriber configured"),
            }),
            Request::Cancel => {
                pool.events().cancel();
                Ok(Reply::ok("cancelled"))
            }
        };
        (Some(reply.unwrap_or_else(Reply::from)), None)
    }
}
