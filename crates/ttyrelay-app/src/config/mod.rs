//! Configuration loading.
//!
//! Settings come from a TOML file (`--config PATH`, or `./ttyrelay.toml` when
//! present) and are then overridden by command-line flags. Every section and
//! every key is optional.

pub mod helpers;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use ttyrelay_protocol::{LineEditingMode, DEFAULT_HIGH_WATER_MARK};
use ttyrelay_terminal::{InferiorKind, MAX_CONCURRENT_SESSIONS};

pub use helpers::{apply_cli, bind_addr, build_factory, log_directive, registry_config};

pub const DEFAULT_CONFIG_FILE: &str = "ttyrelay.toml";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TERM: &str = "xterm-256color";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub flow: FlowConfig,
    pub log: LogConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: InferiorKind,
    /// Program and arguments. Empty runs the user's shell under a PTY.
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// `TERM` for PTY and process children.
    pub term: String,
    /// Entry point name for invocation sessions.
    pub entry: Option<String>,
    pub verbosity: u8,
    /// Overrides the mode announced for the kind.
    pub line_editing_mode: Option<LineEditingMode>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: InferiorKind::Pty,
            command: Vec::new(),
            env: BTreeMap::new(),
            term: DEFAULT_TERM.to_string(),
            entry: None,
            verbosity: 0,
            line_editing_mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub high_water_mark: u32,
    /// Abort a session whose renderer has not confirmed output for this long.
    pub confirm_timeout_ms: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            confirm_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive such as `info` or `ttyrelay_terminal=debug`.
    pub level: Option<String>,
    /// Write a JSONL transcript per session into this directory.
    pub transcript_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub name_prefix: String,
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name_prefix: "ttyrelay".to_string(),
            max_sessions: MAX_CONCURRENT_SESSIONS,
        }
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load `explicit` if given (it must exist), else `./ttyrelay.toml` if it
    /// exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
