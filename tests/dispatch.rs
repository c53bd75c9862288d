// ABOUTME: Integration tests for the request/reply surface.
// ABOUTME: Drives the dispatcher with JSON frames the way the serve loop does.

use serde_json::json;
use sshpool::dispatch::{Dispatcher, Reply, Request, RequestFrame};
use sshpool::events::ChannelSink;
use sshpool::pool::{ErrorCode, PoolSettings, SshPool};
use std::sync::Arc;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(SshPool::new(PoolSettings::default())))
}

async fn call(dispatcher: &Dispatcher, frame: serde_json::Value) -> Option<Reply> {
    let frame: RequestFrame = serde_json::from_value(frame).unwrap();
    match Request::parse(&frame.method, frame.args) {
        Ok(request) => dispatcher.submit(request).await.unwrap(),
        Err(reply) => Some(reply),
    }
}

#[tokio::test]
async fn is_connected_replies_false_for_unknown_key() {
    let d = dispatcher();
    let reply = call(&d, json!({"seq": 1, "method": "isConnected", "args": {"id": "A"}})).await;
    assert_eq!(reply, Some(Reply::ok("false")));
}

#[tokio::test]
async fn execute_on_unknown_key_is_unknown_client() {
    let d = dispatcher();
    let reply = call(
        &d,
        json!({"seq": 2, "method": "execute", "args": {"id": "A", "cmd": "ls"}}),
    )
    .await
    .unwrap();
    assert_eq!(reply.code(), Some(ErrorCode::UnknownClient));
}

#[tokio::test]
async fn close_shell_sends_no_reply() {
    let d = dispatcher();
    let reply = call(&d, json!({"seq": 3, "method": "closeShell", "args": {"id": "A"}})).await;
    assert_eq!(reply, None);
}

#[tokio::test]
async fn unknown_method_is_not_implemented() {
    let d = dispatcher();
    let reply = call(&d, json!({"seq": 4, "method": "portForwardR"})).await.unwrap();
    assert_eq!(reply.code(), Some(ErrorCode::NotImplemented));
}

#[tokio::test]
async fn connect_to_closed_port_is_connection_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let d = dispatcher();
    let reply = call(
        &d,
        json!({"seq": 5, "method": "connectToHost", "args": {
            "id": "A", "host": "127.0.0.1", "port": port,
            "username": "u", "passwordOrKey": "pw"
        }}),
    )
    .await
    .unwrap();
    assert_eq!(reply.code(), Some(ErrorCode::ConnectionFailure));
    assert!(d.pool().keys().is_empty());
}

#[tokio::test]
async fn listen_requires_a_configured_subscriber() {
    let d = dispatcher();
    let reply = d.handle(Request::Listen).await.unwrap();
    assert_eq!(reply.code(), Some(ErrorCode::NotImplemented));
    assert!(!d.pool().events().has_subscriber());
}

#[tokio::test]
async fn listen_and_cancel_toggle_the_subscription() {
    let (sink, _rx) = ChannelSink::new();
    let d = dispatcher().with_subscriber(sink);

    assert_eq!(d.handle(Request::Listen).await, Some(Reply::ok("listening")));
    assert!(d.pool().events().has_subscriber());

    assert_eq!(d.handle(Request::Cancel).await, Some(Reply::ok("cancelled")));
    assert!(!d.pool().events().has_subscriber());
}

#[tokio::test]
async fn requests_run_concurrently() {
    let d = dispatcher();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            d.submit(Request::IsConnected {
                id: Some(format!("k{}", i)),
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(Reply::ok("false")));
    }
}
