// HTTP-polling and WebSocket transports
pub mod routes;
pub mod server;

pub use routes::{create_router, AppError, AppState};
pub use server::{WebServer, WebServerConfig};

/// Transport names added to each session's version string.
pub const HTTP_TRANSPORT: &str = "ttyrelay-http";
pub const WS_TRANSPORT: &str = "ttyrelay-ws";
