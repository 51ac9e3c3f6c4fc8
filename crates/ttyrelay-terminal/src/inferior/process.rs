use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;

use tracing::debug;

use super::{InferiorError, OutputStreams, StartParams, VERSION_ENV};
use crate::lock;

/// A child process with its three standard streams piped.
pub struct ProcessInferior {
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Child>,
}

impl ProcessInferior {
    pub(super) fn spawn(
        command: &[String],
        env: &[(String, String)],
        params: &StartParams,
    ) -> Result<(Self, OutputStreams), InferiorError> {
        let (program, args) = command.split_first().ok_or(InferiorError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .env(VERSION_ENV, &params.version_info)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InferiorError::Spawn {
                command: command.join(" "),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            return Err(InferiorError::Spawn {
                command: command.join(" "),
                message: "child output pipes were not created".to_string(),
            });
        };

        let inferior = Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
        };
        let streams = OutputStreams {
            stdout: Box::new(stdout),
            stderr: Some(Box::new(stderr)),
        };
        Ok((inferior, streams))
    }

    pub(super) fn write(&self, bytes: &[u8]) -> Result<(), InferiorError> {
        let mut guard = lock(&self.stdin);
        let stdin = guard.as_mut().ok_or(InferiorError::InputClosed)?;
        stdin.write_all(bytes)?;
        stdin.flush()?;
        Ok(())
    }

    pub(super) fn try_wait(&self) -> Option<i32> {
        match lock(&self.child).try_wait() {
            // Killed by a signal: report it the way shells do.
            Ok(Some(status)) => Some(status.code().unwrap_or(128)),
            Ok(None) => None,
            Err(e) => {
                debug!("try_wait on child failed: {}", e);
                Some(-1)
            }
        }
    }

    pub(super) fn kill(&self) {
        // Kill first: a writer blocked on a full pipe holds the stdin lock
        // until the child is gone.
        if let Err(e) = lock(&self.child).kill() {
            debug!("kill on child failed: {}", e);
        }
        lock(&self.stdin).take();
    }
}
