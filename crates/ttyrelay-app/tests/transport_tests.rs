mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use common::{get, open, poll_until_closed, post, process_router, router_for, strip_escapes};
use pretty_assertions::assert_eq;
use ttyrelay::{build_registry, Config};
use ttyrelay_protocol::escape::END_OF_STREAM;
use ttyrelay_terminal::{InferiorKind, RegistryConfig};

#[tokio::test]
async fn polling_echo_hi() {
    let (router, registry) = process_router(&["echo", "hi"], RegistryConfig::default());
    let key = open(&router, "VERSION=test-renderer\n").await;

    let out = poll_until_closed(&router, &key).await;
    assert!(out.ends_with(END_OF_STREAM), "{out:?}");
    assert_eq!(strip_escapes(&out), "hi\n");

    // The session goes away once its end marker has been handed out.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (status, _) = post(&router, &format!("/io-{key}"), "").await;
        if status == StatusCode::NOT_FOUND || Instant::now() > deadline {
            assert_eq!(status, StatusCode::NOT_FOUND);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn polling_input_reaches_the_inferior() {
    let (router, _registry) = process_router(&["cat"], RegistryConfig::default());
    let key = open(&router, "").await;

    let (status, _) = post(&router, &format!("/io-{key}"), "ping\r").await;
    assert_eq!(status, StatusCode::OK);

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut out = String::new();
    while !out.contains("ping\n") && Instant::now() < deadline {
        let (_, text) = post(&router, &format!("/io-{key}"), "").await;
        out.push_str(&text);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(strip_escapes(&out).contains("ping\n"), "{out:?}");

    let (status, _) = post(&router, &format!("/close-{key}"), "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&router, &format!("/io-{key}"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_sessions_and_endpoints() {
    let (router, _registry) = process_router(&["cat"], RegistryConfig::default());

    let (status, body) = post(&router, "/io-999", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["status"], 404);

    let (status, _) = post(&router, "/close-999", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post(&router, "/frobnicate", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post(&router, "/io-abc", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_listing() {
    let (router, _registry) = process_router(&["cat"], RegistryConfig::default());
    let key = open(&router, "VERSION=r2\n").await;

    let (status, body) = get(&router, "/sessions").await;
    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_str(&body).unwrap();
    let sessions = listing["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"].to_string(), key);
    assert_eq!(sessions[0]["kind"], "process");
    assert_eq!(sessions[0]["version_info"], "r2;ttyrelay-http;ttyrelay-process");

    post(&router, &format!("/close-{key}"), "").await;
    let (_, body) = get(&router, "/sessions").await;
    let listing: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(listing["sessions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn session_limit_is_service_unavailable() {
    let config = RegistryConfig {
        max_sessions: 1,
        ..RegistryConfig::default()
    };
    let (router, _registry) = process_router(&["cat"], config);
    open(&router, "").await;
    let (status, _) = post(&router, "/open", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn failed_start_is_server_error() {
    let (router, registry) =
        process_router(&["/nonexistent/ttyrelay-test-binary"], RegistryConfig::default());
    let (status, _) = post(&router, "/open", "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn builtin_echo_entry_point() {
    let mut config = Config::default();
    config.backend.kind = InferiorKind::Invocation;
    config.backend.entry = Some("echo".into());
    config.backend.command = vec!["hello".into(), "world".into()];
    let (router, _registry) = router_for(build_registry(&config).unwrap());

    let key = open(&router, "").await;
    let out = poll_until_closed(&router, &key).await;
    assert_eq!(strip_escapes(&out), "hello world\n");
}
