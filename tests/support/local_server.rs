// ABOUTME: In-process SSH server for tests that need no Docker.
// ABOUTME: Either serves scripted exec/shell behavior or refuses every channel request.

use russh::keys::decode_secret_key;
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use sshpool::pool::SshPool;
use sshpool::ssh::Credential;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const HOST_KEY: &str = include_str!("../fixtures/host_key");
pub const PASSWORD: &str = "local-secret";
/// Sent by the shell as soon as it starts.
pub const GREETING: &[u8] = b"L1\r\nL2\r\nL3\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Exec replies `ran: <command>`, shells greet then echo input.
    Scripted,
    /// Exec, pty and shell requests get a channel failure.
    Refuse,
}

#[derive(Clone)]
struct TestHandler {
    behavior: Behavior,
}

impl server::Handler for TestHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, password: &str) -> Result<Auth, Self::Error> {
        if password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.behavior == Behavior::Refuse {
            return session.channel_failure(channel);
        }
        let mut out = b"ran: ".to_vec();
        out.extend_from_slice(data);
        out.push(b'\n');
        session.channel_success(channel)?;
        session.data(channel, CryptoVec::from_slice(&out))?;
        session.exit_status_request(channel, 0)?;
        session.eof(channel)?;
        session.close(channel)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.behavior {
            Behavior::Scripted => session.channel_success(channel),
            Behavior::Refuse => session.channel_failure(channel),
        }
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.behavior == Behavior::Refuse {
            return session.channel_failure(channel);
        }
        session.channel_success(channel)?;
        session.data(channel, CryptoVec::from_slice(GREETING))
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.data(channel, CryptoVec::from_slice(data))
    }
}

/// A listening server; lives until the test's runtime shuts down.
pub struct LocalServer {
    port: u16,
}

impl LocalServer {
    pub async fn start(behavior: Behavior) -> Self {
        let key = decode_secret_key(HOST_KEY, None).expect("fixture host key");
        let config = Arc::new(server::Config {
            keys: vec![key],
            auth_rejection_time: Duration::from_millis(10),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                let handler = TestHandler { behavior };
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, stream, handler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Register a client for `key` in `pool`.
    pub async fn connect(&self, pool: &SshPool, key: &str) {
        pool.connect(key, "127.0.0.1", self.port, "tester", &Credential::password(PASSWORD))
            .await
            .expect("connect to local server");
    }
}
