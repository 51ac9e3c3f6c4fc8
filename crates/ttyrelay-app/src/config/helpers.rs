use anyhow::{anyhow, bail, Context, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use ttyrelay_terminal::{
    BackendFactory, InferiorKind, InvocationTable, LinkOpener, RegistryConfig, SinkConfig,
};

use crate::cli::Cli;
use crate::config::Config;

/// Command-line flags win over the configuration file
pub fn apply_cli(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(kind) = cli.inferior_kind() {
        config.backend.kind = kind;
    }
    if let Some(entry) = &cli.invoke {
        config.backend.entry = Some(entry.clone());
    }
    if !cli.command.is_empty() {
        config.backend.command = cli.command.clone();
    }
    if cli.verbose > 0 {
        config.backend.verbosity = cli.verbose;
    }
}

/// Resolve `server.bind` and `server.port` to a socket address
pub fn bind_addr(config: &Config) -> Result<SocketAddr> {
    (config.server.bind.as_str(), config.server.port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind))?
        .next()
        .ok_or_else(|| anyhow!("Bind address '{}' did not resolve", config.server.bind))
}

/// Build the backend factory for the configured inferior
pub fn build_factory(
    config: &Config,
    invocations: InvocationTable,
    link_opener: Arc<dyn LinkOpener>,
) -> Result<BackendFactory> {
    let backend = &config.backend;
    match backend.kind {
        InferiorKind::Process if backend.command.is_empty() => {
            bail!("The process backend needs a command to run");
        }
        InferiorKind::Invocation => {
            let entry = backend
                .entry
                .as_deref()
                .ok_or_else(|| anyhow!("The invocation backend needs an entry point name"))?;
            if invocations.get(entry).is_none() {
                bail!(
                    "Unknown entry point '{}'. Available: {}",
                    entry,
                    invocations.names().join(", ")
                );
            }
        }
        _ => {}
    }

    let mut factory = BackendFactory::new(backend.kind)
        .command(backend.command.clone())
        .invocations(invocations)
        .verbosity(backend.verbosity)
        .link_opener(link_opener);
    if backend.kind != InferiorKind::Invocation {
        factory = factory.env("TERM", backend.term.as_str());
    }
    for (key, value) in &backend.env {
        factory = factory.env(key.as_str(), value.as_str());
    }
    if let Some(entry) = &backend.entry {
        factory = factory.entry(entry.as_str());
    }
    if let Some(mode) = backend.line_editing_mode {
        factory = factory.line_editing_mode(mode);
    }
    if let Some(dir) = &config.log.transcript_dir {
        factory = factory.transcript_dir(dir.clone());
    }
    Ok(factory)
}

pub fn registry_config(config: &Config) -> RegistryConfig {
    RegistryConfig {
        name_prefix: config.session.name_prefix.clone(),
        max_sessions: config.session.max_sessions,
        sink: SinkConfig {
            high_water_mark: config.flow.high_water_mark,
            confirm_timeout: config.flow.confirm_timeout_ms.map(Duration::from_millis),
        },
    }
}

/// Pick the tracing filter: `RUST_LOG`, then `TTYRELAY_LOG`, then the config
/// file, then `info` (or `debug` with `-vv`)
pub fn log_directive(
    rust_log: Option<String>,
    ttyrelay_log: Option<String>,
    config_level: Option<&str>,
    verbose: u8,
) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or_else(|| ttyrelay_log.filter(|s| !s.trim().is_empty()))
        .or_else(|| config_level.map(str::to_string))
        .unwrap_or_else(|| if verbose >= 2 { "debug" } else { "info" }.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ttyrelay_terminal::{InvocationContext, LogLinkOpener};

    #[test]
    fn cli_overrides_file() {
        let mut config = Config::from_toml_str("[server]\nport = 1000\n[backend]\nkind = \"pty\"\n").unwrap();
        let cli = Cli::try_parse_from(["ttyrelay", "--port", "2000", "--process", "cat"]).unwrap();
        apply_cli(&mut config, &cli);
        assert_eq!(config.server.port, 2000);
        assert_eq!(config.backend.kind, InferiorKind::Process);
        assert_eq!(config.backend.command, vec!["cat".to_string()]);
    }

    #[test]
    fn bind_addr_accepts_hosts_and_ips() {
        let mut config = Config::default();
        config.server.port = 8123;
        assert_eq!(bind_addr(&config).unwrap().to_string(), "127.0.0.1:8123");
        config.server.bind = "::1".into();
        assert_eq!(bind_addr(&config).unwrap().to_string(), "[::1]:8123");
    }

    #[test]
    fn factory_validation() {
        let opener: Arc<dyn LinkOpener> = Arc::new(LogLinkOpener);
        let mut config = Config::default();
        config.backend.kind = InferiorKind::Process;
        assert!(build_factory(&config, InvocationTable::new(), opener.clone()).is_err());

        config.backend.kind = InferiorKind::Invocation;
        config.backend.entry = Some("missing".into());
        let mut table = InvocationTable::new();
        table.register("present", |_ctx: InvocationContext| -> anyhow::Result<()> { Ok(()) });
        let err = build_factory(&config, table.clone(), opener.clone()).unwrap_err();
        assert!(err.to_string().contains("present"));

        config.backend.entry = Some("present".into());
        let factory = build_factory(&config, table, opener).unwrap();
        assert_eq!(factory.kind(), InferiorKind::Invocation);
    }

    #[test]
    fn configured_line_editing_mode_reaches_backends() {
        let mut config = Config::default();
        config.backend.kind = InferiorKind::Process;
        config.backend.command = vec!["cat".into()];
        config.backend.line_editing_mode = Some(ttyrelay_protocol::LineEditingMode::Line);
        let factory = build_factory(&config, InvocationTable::new(), Arc::new(LogLinkOpener)).unwrap();
        assert_eq!(
            factory.create("s-1").unwrap().line_editing_mode(),
            ttyrelay_protocol::LineEditingMode::Line
        );
    }

    #[test]
    fn timeout_is_optional() {
        let mut config = Config::default();
        assert_eq!(registry_config(&config).sink.confirm_timeout, None);
        config.flow.confirm_timeout_ms = Some(1500);
        assert_eq!(
            registry_config(&config).sink.confirm_timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn log_directive_precedence() {
        assert_eq!(log_directive(Some("warn".into()), Some("trace".into()), Some("debug"), 0), "warn");
        assert_eq!(log_directive(Some(" ".into()), Some("trace".into()), None, 0), "trace");
        assert_eq!(log_directive(None, None, Some("error"), 0), "error");
        assert_eq!(log_directive(None, None, None, 0), "info");
        assert_eq!(log_directive(None, None, None, 2), "debug");
    }
}
