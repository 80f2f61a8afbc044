use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use itouch::{Client, ClientConfig, ClientError, ConnectionState, Payload};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Minimal device server: answers `ping`, `screenshot` and `fail`, and pushes
/// a `tick` event after every `ping`.
async fn spawn_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.expect("handshake");
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(&text).expect("request json");
                    for reply in respond(&request) {
                        ws.send(reply).await.expect("send reply");
                    }
                }
            });
        }
    });
    port
}

fn respond(request: &Value) -> Vec<Message> {
    let request_id = request["requestId"].clone();
    match request["type"].as_str() {
        Some("ping") => vec![
            Message::text(
                json!({ "requestId": request_id, "type": "ping", "data": "pong" }).to_string(),
            ),
            Message::text(json!({ "event": "tick", "data": { "n": 1 } }).to_string()),
        ],
        Some("screenshot") => {
            let mut meta = Map::new();
            meta.insert("requestId".to_owned(), request_id);
            meta.insert("type".to_owned(), json!("screenshot"));
            let frame = frames::encode_hybrid(&meta, b"\x89PNG").expect("encode");
            vec![Message::binary(frame)]
        }
        _ => vec![Message::text(
            json!({ "requestId": request_id, "type": "error", "error": "unknown command" })
                .to_string(),
        )],
    }
}

fn config(port: u16) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".to_owned(),
        port,
        auto_reconnect: false,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn invoke_and_events_over_a_real_socket() {
    let port = spawn_server().await;
    let client = Client::new(config(port));
    let (ticks_tx, mut ticks) = mpsc::unbounded_channel();
    client.subscribe("tick", move |payload| {
        let _ = ticks_tx.send(payload.clone());
    });

    client.connect().await.expect("connect");
    assert_eq!(client.state(), ConnectionState::Open);

    let reply = client.invoke_with_timeout("ping", &(), 5).await.expect("pong");
    assert_eq!(reply, Payload::Json(json!("pong")));

    let tick = timeout(Duration::from_secs(5), ticks.recv())
        .await
        .expect("tick in time")
        .expect("listener alive");
    assert_eq!(tick, Payload::Json(json!({ "n": 1 })));

    client.destroy();
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn hybrid_binary_reply_over_a_real_socket() {
    let port = spawn_server().await;
    let client = Client::new(config(port));
    client.connect().await.expect("connect");

    let reply = client
        .invoke_with_timeout("screenshot", &(), 5)
        .await
        .expect("screenshot");
    assert_eq!(reply.as_bytes(), Some(&b"\x89PNG"[..]));
    client.destroy();
}

#[tokio::test]
async fn server_error_surfaces_as_remote() {
    let port = spawn_server().await;
    let client = Client::new(config(port));
    client.connect().await.expect("connect");

    let err = client
        .invoke_with_timeout("reboot", &json!({ "force": true }), 5)
        .await
        .expect_err("unknown command");
    assert!(matches!(
        err,
        ClientError::Remote { ref message, .. } if message == "unknown command"
    ));
    client.destroy();
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let client = Client::new(config(port));
    let err = client.connect().await.expect_err("nothing listening");
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
