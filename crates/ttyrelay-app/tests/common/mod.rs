#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use ttyrelay::{create_router, AppState, WebServer, WebServerConfig};
use ttyrelay_protocol::escape::END_OF_STREAM;
use ttyrelay_terminal::{BackendFactory, InferiorKind, RegistryConfig, SessionRegistry};

/// Router over a registry whose sessions run `command` with plain pipes
pub fn process_router(command: &[&str], config: RegistryConfig) -> (Router, Arc<SessionRegistry>) {
    let factory = BackendFactory::new(InferiorKind::Process)
        .command(command.iter().map(|s| s.to_string()).collect());
    router_for(Arc::new(SessionRegistry::new(factory, config)))
}

pub fn router_for(registry: Arc<SessionRegistry>) -> (Router, Arc<SessionRegistry>) {
    let router = create_router(AppState {
        registry: Arc::clone(&registry),
    });
    (router, registry)
}

/// Serve the full application on an ephemeral local port
pub async fn spawn_server(
    registry: Arc<SessionRegistry>,
) -> (SocketAddr, JoinHandle<anyhow::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = WebServer::new(WebServerConfig { bind_addr: addr }, registry);
    (addr, tokio::spawn(server.serve(listener)))
}

/// Wait until `ready` holds or ten seconds pass
pub async fn eventually(mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !ready() {
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn post(router: &Router, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::post(uri).body(Body::from(body.to_string())).unwrap();
    send(router, request).await
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// `POST /open`, returning the session key
pub async fn open(router: &Router, body: &str) -> String {
    let (status, text) = post(router, "/open", body).await;
    assert_eq!(status, StatusCode::OK, "{text}");
    text.strip_prefix("key=").expect("no key in /open response").to_string()
}

/// Poll `/io-<key>` with empty input until the end-of-stream marker arrives
pub async fn poll_until_closed(router: &Router, key: &str) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut out = String::new();
    while !out.contains(END_OF_STREAM) && Instant::now() < deadline {
        let (status, text) = post(router, &format!("/io-{key}"), "").await;
        assert_eq!(status, StatusCode::OK, "{text}");
        out.push_str(&text);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    out
}

/// Remove CSI (`ESC [ ... letter`) and OSC (`ESC ] ... BEL`) sequences
pub fn strip_escapes(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\x1b' {
            out.push(ch);
            continue;
        }
        let end: fn(char) -> bool = match chars.next() {
            Some('[') => |c| c.is_ascii_alphabetic(),
            Some(']') => |c| c == '\x07',
            _ => continue,
        };
        for c in chars.by_ref() {
            if end(c) {
                break;
            }
        }
    }
    out
}
