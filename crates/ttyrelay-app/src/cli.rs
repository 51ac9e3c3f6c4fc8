use clap::Parser;
use std::path::PathBuf;
use ttyrelay_terminal::InferiorKind;

/// CLI arguments for ttyrelay
#[derive(Parser, Debug, Default)]
#[command(name = "ttyrelay")]
#[command(about = "Relay a terminal session to a remote renderer over HTTP polling or WebSocket")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./ttyrelay.toml when it exists)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TTYRELAY_PORT")]
    pub port: Option<u16>,

    /// Address to bind (e.g. 127.0.0.1 or 0.0.0.0)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Run the command under a pseudo-terminal (default)
    #[arg(long, group = "inferior")]
    pub pty: bool,

    /// Run the command with plain pipes
    #[arg(long, group = "inferior")]
    pub process: bool,

    /// Run a built-in entry point instead of a command
    #[arg(long, value_name = "NAME", group = "inferior")]
    pub invoke: Option<String>,

    /// Trace every input record and event (-vv also turns on debug logging)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List the built-in entry points and exit
    #[arg(long)]
    pub list_entries: bool,

    /// Command to run, or arguments for --invoke
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// The inferior kind chosen on the command line, if any.
    pub fn inferior_kind(&self) -> Option<InferiorKind> {
        if self.invoke.is_some() {
            Some(InferiorKind::Invocation)
        } else if self.process {
            Some(InferiorKind::Process)
        } else if self.pty {
            Some(InferiorKind::Pty)
        } else {
            None
        }
    }
}
