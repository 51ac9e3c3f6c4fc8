//! ttyrelay application library
//!
//! Configuration, logging setup and the HTTP/WebSocket transports around the
//! session engine in `ttyrelay_terminal`.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::info;
use ttyrelay_terminal::SessionRegistry;

pub mod builtins;
pub mod cli;
pub mod config;
pub mod links;
pub mod logging;
pub mod web;

pub use builtins::builtin_entries;
pub use cli::Cli;
pub use config::Config;
pub use links::SystemLinkOpener;
pub use web::{create_router, AppState, WebServer, WebServerConfig};

/// The session registry described by `config`.
pub fn build_registry(config: &Config) -> Result<Arc<SessionRegistry>> {
    let factory = config::build_factory(
        config,
        builtin_entries(),
        Arc::new(SystemLinkOpener::default()),
    )?;
    Ok(Arc::new(SessionRegistry::new(
        factory,
        config::registry_config(config),
    )))
}

/// Run the relay as configured by the command line.
pub async fn run(cli: Cli) -> Result<()> {
    if cli.list_entries {
        for name in builtin_entries().names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = Config::discover(cli.config.as_deref())?;
    config::apply_cli(&mut config, &cli);

    logging::init(&config::log_directive(
        env::var("RUST_LOG").ok(),
        env::var("TTYRELAY_LOG").ok(),
        config.log.level.as_deref(),
        cli.verbose,
    ))?;

    let registry = build_registry(&config)?;
    info!(
        kind = %config.backend.kind,
        command = ?config.backend.command,
        entry = ?config.backend.entry,
        "ttyrelay {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let server_config = WebServerConfig {
        bind_addr: config::bind_addr(&config)?,
    };
    WebServer::new(server_config, registry).start().await
}
