//! The program behind a session.
//!
//! An inferior is one of three variants, fixed when the session is created: a
//! child under a pseudo-terminal, a child with plain pipes, or a registered
//! entry point running on its own thread. Everything above this module sees
//! the same contract: start, write bytes in, read bytes out, wait, terminate.

mod invocation;
mod process;
mod pty;

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ttyrelay_protocol::{LineEditingMode, WindowSize};

pub use invocation::{EntryPoint, InvocationContext, InvocationTable};

use invocation::InvocationInferior;
use process::ProcessInferior;
use pty::PtyInferior;

/// Mode bit: the line discipline is canonical (cooked).
pub const MODE_CANONICAL: u32 = 1 << 0;
/// Mode bit: the line discipline echoes input.
pub const MODE_ECHO: u32 = 1 << 3;

/// Environment variable that carries the session's version string to children.
pub const VERSION_ENV: &str = "TTYRELAY";

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum InferiorError {
    #[error("no command to run")]
    EmptyCommand,

    #[error("failed to start '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("pseudo-terminal error: {0}")]
    Pty(String),

    #[error("inferior I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("inferior input is closed")]
    InputClosed,
}

/// Which variant a backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferiorKind {
    #[default]
    Pty,
    Process,
    Invocation,
}

impl InferiorKind {
    /// The line-editing mode announced when a session of this kind starts.
    pub fn default_line_editing_mode(self) -> LineEditingMode {
        match self {
            // The renderer follows the PTY's own canonical/echo state.
            Self::Pty => LineEditingMode::Auto,
            Self::Process => LineEditingMode::PassThrough,
            Self::Invocation => LineEditingMode::Line,
        }
    }

    /// Tag appended to the session's version string.
    pub fn version_tag(self) -> &'static str {
        match self {
            Self::Pty => "ttyrelay-pty",
            Self::Process => "ttyrelay-process",
            Self::Invocation => "ttyrelay-invoke",
        }
    }
}

impl std::str::FromStr for InferiorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "pty" => Ok(Self::Pty),
            "process" | "pipe" => Ok(Self::Process),
            "invocation" | "invoke" => Ok(Self::Invocation),
            _ => Err(anyhow::anyhow!(
                "Invalid inferior kind: '{}'. Valid options: 'pty', 'process', 'invocation'",
                s
            )),
        }
    }
}

impl std::fmt::Display for InferiorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pty => write!(f, "pty"),
            Self::Process => write!(f, "process"),
            Self::Invocation => write!(f, "invocation"),
        }
    }
}

/// What a backend will start once its session begins.
#[derive(Clone)]
pub enum InferiorSpec {
    /// Run `command` under a pseudo-terminal; an empty command means the user's shell.
    Pty {
        command: Vec<String>,
        env: Vec<(String, String)>,
    },
    Process {
        command: Vec<String>,
        env: Vec<(String, String)>,
    },
    Invocation {
        name: String,
        entry: Arc<dyn EntryPoint>,
        args: Vec<String>,
    },
}

impl InferiorSpec {
    pub fn kind(&self) -> InferiorKind {
        match self {
            Self::Pty { .. } => InferiorKind::Pty,
            Self::Process { .. } => InferiorKind::Process,
            Self::Invocation { .. } => InferiorKind::Invocation,
        }
    }

    /// Human-readable command line, for logs and session listings.
    pub fn describe(&self) -> String {
        match self {
            Self::Pty { command, .. } if command.is_empty() => pty::default_shell(),
            Self::Pty { command, .. } | Self::Process { command, .. } => command.join(" "),
            Self::Invocation { name, args, .. } => {
                std::iter::once(name.as_str())
                    .chain(args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    }
}

impl std::fmt::Debug for InferiorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferiorSpec")
            .field("kind", &self.kind())
            .field("command", &self.describe())
            .finish()
    }
}

/// Values that are only known when the inferior is actually started.
#[derive(Debug, Clone)]
pub struct StartParams {
    pub version_info: String,
    pub size: WindowSize,
}

impl Default for StartParams {
    fn default() -> Self {
        Self {
            version_info: String::new(),
            size: WindowSize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            },
        }
    }
}

/// Readable ends of the inferior's output.
pub struct OutputStreams {
    pub stdout: Box<dyn Read + Send>,
    /// Separate error stream; `None` when stderr shares the terminal.
    pub stderr: Option<Box<dyn Read + Send>>,
}

/// A started inferior.
pub enum Inferior {
    Pty(PtyInferior),
    Process(ProcessInferior),
    Invocation(InvocationInferior),
}

impl Inferior {
    pub fn start(
        spec: &InferiorSpec,
        params: &StartParams,
    ) -> Result<(Self, OutputStreams), InferiorError> {
        match spec {
            InferiorSpec::Pty { command, env } => {
                let (inferior, streams) = PtyInferior::spawn(command, env, params)?;
                Ok((Self::Pty(inferior), streams))
            }
            InferiorSpec::Process { command, env } => {
                let (inferior, streams) = ProcessInferior::spawn(command, env, params)?;
                Ok((Self::Process(inferior), streams))
            }
            InferiorSpec::Invocation { name, entry, args } => {
                let (inferior, streams) =
                    InvocationInferior::spawn(name, Arc::clone(entry), args, params)?;
                Ok((Self::Invocation(inferior), streams))
            }
        }
    }

    pub fn kind(&self) -> InferiorKind {
        match self {
            Self::Pty(_) => InferiorKind::Pty,
            Self::Process(_) => InferiorKind::Process,
            Self::Invocation(_) => InferiorKind::Invocation,
        }
    }

    pub fn write_input(&self, bytes: &[u8]) -> Result<(), InferiorError> {
        match self {
            Self::Pty(p) => p.write(bytes),
            Self::Process(p) => p.write(bytes),
            Self::Invocation(p) => p.write(bytes),
        }
    }

    /// Current `MODE_*` bits. Pipe-based variants, and a PTY whose attributes
    /// cannot be read, report canonical with echo.
    pub fn mode_bits(&self) -> u32 {
        let cooked = MODE_CANONICAL | MODE_ECHO;
        match self {
            Self::Pty(p) => p.mode_bits().unwrap_or(cooked),
            Self::Process(_) | Self::Invocation(_) => cooked,
        }
    }

    /// Resize the terminal. Ignored by pipe-based variants.
    pub fn resize(&self, size: WindowSize) -> Result<(), InferiorError> {
        match self {
            Self::Pty(p) => p.resize(size),
            Self::Process(_) | Self::Invocation(_) => Ok(()),
        }
    }

    /// Non-blocking exit check.
    pub fn try_wait(&self) -> Option<i32> {
        match self {
            Self::Pty(p) => p.try_wait(),
            Self::Process(p) => p.try_wait(),
            Self::Invocation(p) => p.try_wait(),
        }
    }

    /// Block until the inferior has exited and return its exit code.
    ///
    /// Polls so that `terminate` can still get at the child meanwhile.
    pub fn wait(&self) -> i32 {
        loop {
            if let Some(code) = self.try_wait() {
                return code;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    /// Kill the child, or close an invocation's input, so the output streams
    /// reach end-of-stream.
    pub fn terminate(&self) {
        match self {
            Self::Pty(p) => p.kill(),
            Self::Process(p) => p.kill(),
            Self::Invocation(p) => p.close_input(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("PTY".parse::<InferiorKind>().unwrap(), InferiorKind::Pty);
        assert_eq!("pipe".parse::<InferiorKind>().unwrap(), InferiorKind::Process);
        assert_eq!("invoke".parse::<InferiorKind>().unwrap(), InferiorKind::Invocation);
        assert!("tmux".parse::<InferiorKind>().is_err());
        assert_eq!(InferiorKind::Invocation.to_string(), "invocation");
    }

    #[test]
    fn default_modes_per_kind() {
        assert_eq!(InferiorKind::Pty.default_line_editing_mode(), LineEditingMode::Auto);
        assert_eq!(
            InferiorKind::Process.default_line_editing_mode(),
            LineEditingMode::PassThrough
        );
    }

    #[test]
    fn describe_joins_arguments() {
        let spec = InferiorSpec::Process {
            command: vec!["echo".into(), "hi".into()],
            env: Vec::new(),
        };
        assert_eq!(spec.describe(), "echo hi");
        assert_eq!(spec.kind(), InferiorKind::Process);
    }
}
