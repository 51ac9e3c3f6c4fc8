mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, spawn_server, strip_escapes};
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use ttyrelay_protocol::escape::END_OF_STREAM;
use ttyrelay_terminal::{BackendFactory, InferiorKind, RegistryConfig, SessionRegistry};

fn process_registry(command: &[&str]) -> Arc<SessionRegistry> {
    let factory = BackendFactory::new(InferiorKind::Process)
        .command(command.iter().map(|s| s.to_string()).collect());
    Arc::new(SessionRegistry::new(factory, RegistryConfig::default()))
}

#[tokio::test]
async fn websocket_session_starts_on_first_message_and_closes_after_output() {
    let registry = process_registry(&["echo", "hi"]);
    let (addr, server) = spawn_server(Arc::clone(&registry)).await;

    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The session exists as soon as the socket is up but waits for input.
    assert!(eventually(|| registry.len() == 1).await);
    assert!(!registry.sessions()[0].started);

    ws_tx
        .send(Message::Text("VERSION=ws-test\n".into()))
        .await
        .unwrap();

    let mut out = String::new();
    let mut close_frame = false;
    let collect = async {
        while let Some(message) = ws_rx.next().await {
            match message.unwrap() {
                Message::Text(text) => out.push_str(&text),
                Message::Close(_) => {
                    close_frame = true;
                    break;
                }
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("no close frame");

    assert!(close_frame);
    assert!(out.ends_with(END_OF_STREAM), "{out:?}");
    assert_eq!(strip_escapes(&out), "hi\n");
    assert!(eventually(|| registry.is_empty()).await);

    server.abort();
}

#[tokio::test]
async fn websocket_input_reaches_the_inferior_and_drop_evicts_the_session() {
    let registry = process_registry(&["cat"]);
    let (addr, server) = spawn_server(Arc::clone(&registry)).await;

    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let (mut ws_tx, mut ws_rx) = socket.split();
    ws_tx
        .send(Message::Text("VERSION=ws-test\n".into()))
        .await
        .unwrap();
    ws_tx.send(Message::Text("hello\r".into())).await.unwrap();

    let mut out = String::new();
    let collect = async {
        while !out.contains("hello\n") {
            match ws_rx.next().await {
                Some(Ok(Message::Text(text))) => out.push_str(&text),
                Some(Ok(_)) => {}
                other => panic!("socket ended early: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("no echo from cat");
    assert_eq!(strip_escapes(&out), "hello\n");

    let sessions = registry.sessions();
    let info = &sessions[0];
    assert!(info.started);
    assert_eq!(info.transport, "ttyrelay-ws");
    assert_eq!(info.version_info, "ws-test;ttyrelay-ws;ttyrelay-process");

    // Going away without a close frame still removes the session.
    drop(ws_tx);
    drop(ws_rx);
    assert!(eventually(|| registry.is_empty()).await);

    server.abort();
}
