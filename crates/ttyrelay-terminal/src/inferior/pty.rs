use std::io::Write;
use std::sync::Mutex;

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tracing::debug;
use ttyrelay_protocol::WindowSize;

use super::{InferiorError, OutputStreams, StartParams, VERSION_ENV};
use crate::lock;

/// A child process attached to the slave side of a pseudo-terminal.
pub struct PtyInferior {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    child: Mutex<Box<dyn portable_pty::Child + Send + Sync>>,
}

pub(super) fn default_shell() -> String {
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }
}

fn pty_size(size: WindowSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: size.pixel_width,
        pixel_height: size.pixel_height,
    }
}

fn pty_error(err: anyhow::Error) -> InferiorError {
    InferiorError::Pty(format!("{err:#}"))
}

impl PtyInferior {
    pub(super) fn spawn(
        command: &[String],
        env: &[(String, String)],
        params: &StartParams,
    ) -> Result<(Self, OutputStreams), InferiorError> {
        let argv = if command.is_empty() {
            vec![default_shell()]
        } else {
            command.to_vec()
        };

        let pair = native_pty_system()
            .openpty(pty_size(params.size))
            .map_err(pty_error)?;

        let mut cmd = CommandBuilder::new(&argv[0]);
        cmd.args(&argv[1..]);
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.env(VERSION_ENV, &params.version_info);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| InferiorError::Spawn {
                command: argv.join(" "),
                message: format!("{e:#}"),
            })?;
        // Only the child keeps the slave open, so its exit ends our reads.
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(pty_error)?;
        let writer = pair.master.take_writer().map_err(pty_error)?;

        let inferior = Self {
            master: Mutex::new(pair.master),
            writer: Mutex::new(Some(writer)),
            child: Mutex::new(child),
        };
        let streams = OutputStreams {
            stdout: reader,
            stderr: None,
        };
        Ok((inferior, streams))
    }

    pub(super) fn write(&self, bytes: &[u8]) -> Result<(), InferiorError> {
        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or(InferiorError::InputClosed)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub(super) fn mode_bits(&self) -> Option<u32> {
        #[cfg(unix)]
        {
            let fd = lock(&self.master).as_raw_fd()?;
            termios_mode_bits(fd)
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    pub(super) fn resize(&self, size: WindowSize) -> Result<(), InferiorError> {
        lock(&self.master).resize(pty_size(size)).map_err(pty_error)
    }

    pub(super) fn try_wait(&self) -> Option<i32> {
        lock(&self.child)
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code() as i32)
    }

    pub(super) fn kill(&self) {
        if let Err(e) = lock(&self.child).kill() {
            // Usually the child is already gone.
            debug!("kill on pty child failed: {}", e);
        }
        lock(&self.writer).take();
    }
}

#[cfg(unix)]
fn termios_mode_bits(fd: std::os::unix::io::RawFd) -> Option<u32> {
    use super::{MODE_CANONICAL, MODE_ECHO};

    // SAFETY: termios is plain data and tcgetattr fills it or fails.
    let mut term: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut term) } != 0 {
        return None;
    }
    let mut bits = 0;
    if term.c_lflag & libc::ICANON != 0 {
        bits |= MODE_CANONICAL;
    }
    if term.c_lflag & libc::ECHO != 0 {
        bits |= MODE_ECHO;
    }
    Some(bits)
}
