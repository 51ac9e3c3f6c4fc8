use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::info;
use ttyrelay_terminal::LinkOpener;

/// Opens links with the desktop's default handler.
#[derive(Debug, Clone)]
pub struct SystemLinkOpener {
    program: String,
    args: Vec<String>,
}

impl Default for SystemLinkOpener {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::with_command("open", &[])
        } else if cfg!(windows) {
            Self::with_command("cmd", &["/C", "start", ""])
        } else {
            Self::with_command("xdg-open", &[])
        }
    }
}

impl SystemLinkOpener {
    /// Run `program args... <uri>` for each link.
    pub fn with_command(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LinkOpener for SystemLinkOpener {
    fn open(&self, uri: &str) -> Result<()> {
        info!(uri, opener = %self.program, "opening link");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(uri)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Failed to run {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}
