// ABOUTME: Integration tests against a live SSH server.
// ABOUTME: Tests run against a shared Docker container and are ignored unless Docker is available.

mod support;

use sshpool::events::{ChannelSink, EventName, ShellEvent};
use sshpool::pool::{ErrorCode, PoolSettings, SshPool};
use sshpool::ssh::{Credential, Session, SessionConfig};
use std::time::Duration;
use support::ssh_container::{SSH_PORT, SshContainer, shared_container};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::UnboundedReceiver;

async fn connected_pool(container: &SshContainer, key: &str) -> SshPool {
    let pool = SshPool::new(PoolSettings::default());
    pool.connect(
        key,
        container.host(),
        container.port(),
        container.user(),
        &container.credential(),
    )
    .await
    .expect("connection should succeed");
    pool
}

/// Wait for the first event matching `pred`, skipping others.
async fn wait_for(
    rx: &mut UnboundedReceiver<ShellEvent>,
    pred: impl Fn(&ShellEvent) -> bool,
) -> ShellEvent {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let event = rx.recv().await.expect("event stream open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

/// Test: Connect, run `echo ok`, disconnect.
/// Expected: Output is "ok\r\n" and the key is gone afterwards.
#[tokio::test]
#[ignore = "requires docker"]
async fn connect_execute_disconnect() {
    support::init_tracing();
    let container = shared_container().await;
    let pool = connected_pool(container, "A").await;

    assert!(pool.is_connected("A"));
    let output = pool.execute("A", "echo ok").await.expect("execute");
    assert_eq!(output, "ok\r\n");

    pool.disconnect("A").await.expect("disconnect");
    assert!(!pool.is_connected("A"));

    let err = pool.execute("A", "echo ok").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownClient);
}

/// Test: Multi-line output and empty output.
/// Expected: Every line ends with CRLF; no output yields an empty string.
#[tokio::test]
#[ignore = "requires docker"]
async fn execute_normalizes_line_endings() {
    let container = shared_container().await;
    let pool = connected_pool(container, "lines").await;

    let output = pool
        .execute("lines", "printf 'a\\nb\\r\\nc'")
        .await
        .expect("execute");
    assert_eq!(output, "a\r\nb\r\nc\r\n");

    let output = pool.execute("lines", "true").await.expect("execute");
    assert_eq!(output, "");

    pool.close_all().await;
}

/// Test: A wrong password.
/// Expected: connection_failure and no record is registered.
#[tokio::test]
#[ignore = "requires docker"]
async fn wrong_password_fails_to_connect() {
    let container = shared_container().await;
    let pool = SshPool::new(PoolSettings::default());

    let err = pool
        .connect(
            "bad",
            container.host(),
            container.port(),
            container.user(),
            &Credential::password("not-the-password"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ConnectionFailure);
    assert!(!pool.is_connected("bad"));
    assert!(pool.keys().is_empty());
}

/// Test: Connect twice under the same key.
/// Expected: One record remains and it is usable.
#[tokio::test]
#[ignore = "requires docker"]
async fn reconnect_replaces_record() {
    let container = shared_container().await;
    let pool = connected_pool(container, "R").await;
    pool.connect(
        "R",
        container.host(),
        container.port(),
        container.user(),
        &container.credential(),
    )
    .await
    .expect("reconnect");

    assert_eq!(pool.keys(), vec!["R".to_string()]);
    assert_eq!(pool.execute("R", "echo again").await.unwrap(), "again\r\n");
    pool.close_all().await;
}

/// Test: Start a shell, write a command, close it.
/// Expected: The command's output arrives as a Shell event, then ShellClosed.
#[tokio::test]
#[ignore = "requires docker"]
async fn shell_round_trip() {
    support::init_tracing();
    let container = shared_container().await;
    let pool = connected_pool(container, "S").await;

    let (sink, mut rx) = ChannelSink::new();
    pool.events().listen(sink);

    pool.start_shell("S", "xterm").await.expect("start shell");
    pool.write_to_shell("S", "echo hi-from-shell\n")
        .await
        .expect("write");

    let event = wait_for(&mut rx, |e| {
        e.name == EventName::Shell && e.value.trim_end() == "hi-from-shell"
    })
    .await;
    assert_eq!(event.key, "S");
    assert!(event.value.ends_with('\n'));

    pool.close_shell("S").await;
    let closed = wait_for(&mut rx, |e| e.name == EventName::ShellClosed).await;
    assert_eq!(closed.key, "S");

    let err = pool.write_to_shell("S", "ls\n").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::WriteFailure);

    pool.close_all().await;
}

/// Test: Remote `exit` ends the shell.
/// Expected: ShellClosed arrives without an explicit close.
#[tokio::test]
#[ignore = "requires docker"]
async fn remote_exit_closes_shell() {
    let container = shared_container().await;
    let pool = connected_pool(container, "E").await;

    let (sink, mut rx) = ChannelSink::new();
    pool.events().listen(sink);

    pool.start_shell("E", "vt100").await.expect("start shell");
    pool.write_to_shell("E", "exit\n").await.expect("write");

    let closed = wait_for(&mut rx, |e| e.name == EventName::ShellClosed).await;
    assert_eq!(closed.key, "E");
    pool.close_all().await;
}

/// Test: Forward a local port to the container's own sshd.
/// Expected: Reading through the forward yields an SSH banner.
#[tokio::test]
#[ignore = "requires docker"]
async fn forward_local_port_to_remote_sshd() {
    support::init_tracing();
    let container = shared_container().await;
    let pool = connected_pool(container, "F").await;

    let port = pool
        .forward_local("F", 0, "127.0.0.1", SSH_PORT)
        .await
        .expect("forward");
    assert_ne!(port, 0);

    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to forwarded port");
    let mut buf = [0u8; 32];
    let n = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut buf))
        .await
        .expect("banner in time")
        .expect("read banner");
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("SSH-"));

    pool.disconnect("F").await.expect("disconnect");
    assert!(
        tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_err(),
        "forward listener should stop with the client"
    );
}

/// Test: Session-level exec keeps stderr and the exit status apart.
/// Expected: stdout empty, stderr captured, exit code reported.
#[tokio::test]
#[ignore = "requires docker"]
async fn session_exec_reports_exit_status() {
    let container = shared_container().await;
    let config = SessionConfig::new(container.host(), container.user()).port(container.port());
    let session = Session::connect(config, &container.credential())
        .await
        .expect("connection should succeed");

    let output = session.exec("echo oops >&2; exit 3").await.expect("exec");
    assert_eq!(output.exit_code, Some(3));
    assert!(!output.success());
    assert!(output.stdout.is_empty());
    assert_eq!(output.stderr_lossy().trim(), "oops");

    session.disconnect().await.expect("disconnect");
    assert!(!session.is_connected());
}
