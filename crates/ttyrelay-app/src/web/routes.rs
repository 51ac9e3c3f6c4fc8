use axum::{
    body::Bytes,
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use ttyrelay_terminal::{Delivery, RegistryError, SessionId, SessionRegistry};

use super::{HTTP_TRANSPORT, WS_TRANSPORT};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

/// Create router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/open", post(open_session))
        .route("/sessions", get(list_sessions))
        .route("/ws", get(websocket_handler))
        // `/io-<id>` and `/close-<id>`
        .route("/:endpoint", post(session_endpoint))
        .with_state(state)
}

/// POST /open - Start a session; the body may begin with `VERSION=...`
async fn open_session(State(state): State<AppState>, body: Bytes) -> Result<String, AppError> {
    let handshake = String::from_utf8_lossy(&body).into_owned();
    let registry = Arc::clone(&state.registry);
    let id = tokio::task::spawn_blocking(move || {
        registry.open_and_start(Delivery::Poll, HTTP_TRANSPORT, &handshake)
    })
    .await??;
    Ok(format!("key={id}"))
}

/// GET /sessions - List all live sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "sessions": state.registry.sessions() }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Io(SessionId),
    Close(SessionId),
}

fn parse_endpoint(endpoint: &str) -> Result<Endpoint, AppError> {
    let (make, id): (fn(SessionId) -> Endpoint, &str) =
        if let Some(id) = endpoint.strip_prefix("io-") {
            (Endpoint::Io, id)
        } else if let Some(id) = endpoint.strip_prefix("close-") {
            (Endpoint::Close, id)
        } else {
            return Err(AppError::NotFound(format!("no such endpoint /{endpoint}")));
        };
    id.parse()
        .map(make)
        .map_err(|_| AppError::BadRequest(format!("invalid session id '{id}'")))
}

/// POST /io-<id> and POST /close-<id>
async fn session_endpoint(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    body: Bytes,
) -> Result<String, AppError> {
    let registry = Arc::clone(&state.registry);
    match parse_endpoint(&endpoint)? {
        Endpoint::Io(id) => {
            let input = String::from_utf8_lossy(&body).into_owned();
            let output = tokio::task::spawn_blocking(move || exchange(&registry, id, &input)).await??;
            Ok(output)
        }
        Endpoint::Close(id) => {
            tokio::task::spawn_blocking(move || registry.close(id)).await??;
            Ok(String::new())
        }
    }
}

/// Deliver one poll's input and collect the output written since the last
/// poll. The session is dropped once its output has ended.
fn exchange(registry: &SessionRegistry, id: SessionId, input: &str) -> Result<String, RegistryError> {
    let session = registry.get(id)?;
    if let Err(e) = registry.deliver_input(id, input) {
        // deliver_input closed the session, so the buffer ends with the marker.
        warn!(session = %id, "input failed: {}", e);
        return Ok(session.sink().drain());
    }
    let (output, closed) = registry.drain_output(id)?;
    if closed && registry.close(id).is_err() {
        debug!(session = %id, "already closed");
    }
    Ok(output)
}

/// GET /ws - WebSocket endpoint; one session per connection
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();
    let registry = Arc::clone(&state.registry);
    let id = match registry.open(Delivery::Push(output_tx), WS_TRANSPORT) {
        Ok(id) => id,
        Err(e) => {
            error!("WebSocket: cannot open session: {}", e);
            return;
        }
    };
    info!(session = %id, "WebSocket connected");

    // Split socket
    let (mut ws_sink, mut ws_stream) = socket.split();

    // The channel closes when the session's output ends
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = output_rx.recv().await {
            if ws_sink.send(WsMessage::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = ws_sink.send(WsMessage::Close(None)).await;
    });

    let mut output_ended = false;
    loop {
        tokio::select! {
            message = ws_stream.next() => {
                let text = match message {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(session = %id, "WebSocket error: {}", e);
                        break;
                    }
                };
                let registry = Arc::clone(&registry);
                match tokio::task::spawn_blocking(move || registry.deliver_input(id, &text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(session = %id, "input failed: {}", e);
                        break;
                    }
                    Err(e) => {
                        error!(session = %id, "input task failed: {}", e);
                        break;
                    }
                }
            }
            _ = &mut send_task => {
                output_ended = true;
                break;
            }
        }
    }

    // Client disconnected or output ended
    let closing = Arc::clone(&registry);
    if let Ok(Err(RegistryError::UnknownSession(_))) =
        tokio::task::spawn_blocking(move || closing.close(id)).await
    {
        debug!(session = %id, "already closed");
    }
    // Let the end marker and close frame go out
    if !output_ended
        && tokio::time::timeout(Duration::from_secs(1), &mut send_task)
            .await
            .is_err()
    {
        send_task.abort();
    }
    info!(session = %id, "WebSocket disconnected");
}

/// Error type for route handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Registry(RegistryError::UnknownSession(_)) => StatusCode::NOT_FOUND,
            AppError::Registry(RegistryError::TooManySessions(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Registry(RegistryError::Backend(_)) | AppError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
