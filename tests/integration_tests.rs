//! End-to-end integration tests — full JSON-RPC request/response cycle
//! through a running transport, over WebSocket and HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rpc_protocol::RpcError;
use rpc_server::{ApiBinder, MethodRegistry, RpcServer, adapt};
use rpc_transport::{TransportConfig, TransportServer};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a server on a random port. Returns the port and the count of `log`
/// notifications received.
async fn start_test_server() -> (u16, Arc<AtomicUsize>) {
    let logged = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(MethodRegistry::new());
    let server = RpcServer::from_current(registry.clone()).unwrap();

    ApiBinder::new(&registry)
        .method("add", |(a, b): (i64, i64)| async move { Ok::<_, RpcError>(a + b) })
        .unwrap()
        .method("sleep", |(ms,): (u64,)| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, RpcError>(ms)
        })
        .unwrap();

    let counter = logged.clone();
    ApiBinder::new(&registry)
        .method("log", move |(line,): (String,)| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if line == "fail" {
                    panic!("log sink unavailable");
                }
                Ok::<_, RpcError>(())
            }
        })
        .unwrap();

    // Hands out a callback that multiplies by the given factor
    let callbacks = server.callbacks().clone();
    ApiBinder::new(&registry)
        .method("multiplier", move |(factor,): (i64,)| {
            let callbacks = callbacks.clone();
            async move {
                let times = adapt(move |(n,): (i64,)| async move { Ok::<_, RpcError>(n * factor) });
                Ok::<_, RpcError>(callbacks.register(times).to_ref())
            }
        })
        .unwrap();

    let config = TransportConfig {
        port: 0, // OS-assigned
        max_connections: Some(16),
        ..TransportConfig::default()
    };

    let transport = TransportServer::start(config, server).await.unwrap();
    let port = transport.port();

    // Leak the transport to keep it running for the test
    Box::leak(Box::new(transport));

    (port, logged)
}

async fn connect(port: u16) -> WsStream {
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn read_text(ws: &mut WsStream) -> String {
    let msg = timeout(Duration::from_secs(10), ws.next())
        .await
        .expect("Timeout waiting for response")
        .expect("Stream ended")
        .expect("WebSocket error");
    msg.into_text().unwrap().to_string()
}

async fn post(port: u16, body: &str) -> (u16, String) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/rpc"))
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.text().await.unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ws_add_returns_exact_response() {
    let (port, _) = start_test_server().await;
    let mut ws = connect(port).await;

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"add","params":[1,2],"id":1}"#).await;
    assert_eq!(read_text(&mut ws).await, r#"{"jsonrpc":"2.0","result":3,"id":1}"#);
}

#[tokio::test]
async fn ws_parse_error() {
    let (port, _) = start_test_server().await;
    let mut ws = connect(port).await;

    send_text(&mut ws, "not-json").await;
    assert_eq!(
        read_text(&mut ws).await,
        r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#
    );
}

#[tokio::test]
async fn ws_protocol_errors_echo_ids() {
    let (port, _) = start_test_server().await;
    let mut ws = connect(port).await;

    send_text(&mut ws, r#"{"jsonrpc":"1.0","method":"add","id":2}"#).await;
    let resp: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
    assert_eq!(resp["error"]["code"], -32600);
    assert_eq!(resp["id"], 2);

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"unknown","id":3}"#).await;
    let resp: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
    assert_eq!(resp["error"]["code"], -32601);
    assert_eq!(resp["id"], 3);
}

#[tokio::test]
async fn ws_large_numeric_id_round_trips() {
    let (port, _) = start_test_server().await;
    let mut ws = connect(port).await;

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"add","params":[1,2],"id":123456789012345678901234567890}"#).await;
    assert_eq!(
        read_text(&mut ws).await,
        r#"{"jsonrpc":"2.0","result":3,"id":123456789012345678901234567890}"#
    );
}

#[tokio::test]
async fn ws_notifications_get_no_reply() {
    let (port, logged) = start_test_server().await;
    let mut ws = connect(port).await;

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"log","params":["hi"]}"#).await;
    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"log","params":["fail"]}"#).await;
    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"add","params":[20,22],"id":"after"}"#).await;

    // The only reply is the request sent after both notifications
    let resp: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
    assert_eq!(resp["id"], "after");
    assert_eq!(resp["result"], 42);

    let quiet = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(quiet.is_err(), "notifications must not produce replies");
    assert_eq!(logged.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ws_slow_request_does_not_block_fast_one() {
    let (port, _) = start_test_server().await;
    let mut ws = connect(port).await;

    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"sleep","params":[300],"id":"slow"}"#).await;
    send_text(&mut ws, r#"{"jsonrpc":"2.0","method":"add","params":[1,1],"id":"fast"}"#).await;

    let first: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
    let second: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
    assert_eq!(first["id"], "fast");
    assert_eq!(second["id"], "slow");
    assert_eq!(second["result"], 300);
}

#[tokio::test]
async fn ws_many_concurrent_clients() {
    let (port, _) = start_test_server().await;

    let clients: Vec<_> = (0..8i64)
        .map(|n| {
            tokio::spawn(async move {
                let mut ws = connect(port).await;
                let req = json!({"jsonrpc": "2.0", "method": "add", "params": [n, n], "id": n});
                send_text(&mut ws, &req.to_string()).await;
                let resp: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
                assert_eq!(resp["id"], n);
                assert_eq!(resp["result"], 2 * n);
            })
        })
        .collect();

    for client in clients {
        client.await.unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn http_request_and_notification() {
    let (port, logged) = start_test_server().await;

    let (status, body) = post(port, r#"{"jsonrpc":"2.0","method":"add","params":[5,6],"id":"h1"}"#).await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"jsonrpc":"2.0","result":11,"id":"h1"}"#);

    let (status, body) = post(port, r#"{"jsonrpc":"2.0","method":"log","params":["hi"]}"#).await;
    assert_eq!(status, 204);
    assert!(body.is_empty());
    assert_eq!(logged.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_invalid_params() {
    let (port, _) = start_test_server().await;

    let (status, body) = post(port, r#"{"jsonrpc":"2.0","method":"add","params":["a"],"id":9}"#).await;
    assert_eq!(status, 200);
    let resp: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["id"], 9);
}

#[tokio::test]
async fn health_endpoint() {
    let (port, _) = start_test_server().await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["methods"], 4);
}

#[tokio::test]
async fn http_callback_lifecycle() {
    let (port, _) = start_test_server().await;

    let (_, body) = post(port, r#"{"jsonrpc":"2.0","method":"multiplier","params":[3],"id":1}"#).await;
    let marker = serde_json::from_str::<Value>(&body).unwrap()["result"].clone();
    assert!(marker["$callback"].is_string());

    let call = json!({"jsonrpc": "2.0", "method": "$/callback", "params": {"$callback": marker["$callback"].clone(), "args": [14]}, "id": 2});
    let (_, body) = post(port, &call.to_string()).await;
    assert_eq!(body, r#"{"jsonrpc":"2.0","result":42,"id":2}"#);

    let dispose = json!({"jsonrpc": "2.0", "method": "$/dispose", "params": marker, "id": 3});
    let (_, body) = post(port, &dispose.to_string()).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["result"], true);

    let (_, body) = post(port, &call.to_string()).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["error"]["code"], -32601);
}
