use std::collections::HashMap;
use std::io::{PipeReader, PipeWriter, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use super::{InferiorError, OutputStreams, StartParams};
use crate::lock;

/// Everything an entry point gets to work with. Its streams are private to
/// this invocation; dropping the context ends the session's output.
pub struct InvocationContext {
    pub name: String,
    pub args: Vec<String>,
    pub version_info: String,
    pub stdin: PipeReader,
    pub stdout: PipeWriter,
    pub stderr: PipeWriter,
}

/// A function that can be run as a session's inferior.
pub trait EntryPoint: Send + Sync {
    fn invoke(&self, ctx: InvocationContext) -> anyhow::Result<()>;
}

impl<F> EntryPoint for F
where
    F: Fn(InvocationContext) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, ctx: InvocationContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Named entry points available to invocation sessions.
#[derive(Clone, Default)]
pub struct InvocationTable {
    entries: HashMap<String, Arc<dyn EntryPoint>>,
}

impl InvocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, entry: impl EntryPoint + 'static) {
        self.entries.insert(name.into(), Arc::new(entry));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EntryPoint>> {
        self.entries.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for InvocationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationTable")
            .field("entries", &self.names())
            .finish()
    }
}

/// An entry point running on its own thread.
pub struct InvocationInferior {
    stdin: Mutex<Option<PipeWriter>>,
    thread: Mutex<Option<JoinHandle<i32>>>,
    exit_code: Mutex<Option<i32>>,
}

impl InvocationInferior {
    pub(super) fn spawn(
        name: &str,
        entry: Arc<dyn EntryPoint>,
        args: &[String],
        params: &StartParams,
    ) -> Result<(Self, OutputStreams), InferiorError> {
        let (stdin_reader, stdin_writer) = std::io::pipe()?;
        let (stdout_reader, stdout_writer) = std::io::pipe()?;
        let (stderr_reader, stderr_writer) = std::io::pipe()?;
        let mut report = stderr_writer.try_clone()?;

        let ctx = InvocationContext {
            name: name.to_string(),
            args: args.to_vec(),
            version_info: params.version_info.clone(),
            stdin: stdin_reader,
            stdout: stdout_writer,
            stderr: stderr_writer,
        };

        let label = name.to_string();
        let thread = std::thread::Builder::new()
            .name(format!("invoke-{name}"))
            .spawn(move || match entry.invoke(ctx) {
                Ok(()) => {
                    debug!(entry = %label, "entry point returned");
                    0
                }
                Err(e) => {
                    warn!(entry = %label, "entry point failed: {:#}", e);
                    let _ = writeln!(report, "{label}: {e:#}");
                    1
                }
            })
            .map_err(|e| InferiorError::Spawn {
                command: name.to_string(),
                message: e.to_string(),
            })?;

        let inferior = Self {
            stdin: Mutex::new(Some(stdin_writer)),
            thread: Mutex::new(Some(thread)),
            exit_code: Mutex::new(None),
        };
        let streams = OutputStreams {
            stdout: Box::new(stdout_reader),
            stderr: Some(Box::new(stderr_reader)),
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
        let mut exit_code = lock(&self.exit_code);
        if exit_code.is_none() {
            let mut thread = lock(&self.thread);
            if thread.as_ref().is_some_and(|t| t.is_finished()) {
                let code = match thread.take().map(JoinHandle::join) {
                    Some(Ok(code)) => code,
                    // The entry point panicked.
                    _ => 101,
                };
                *exit_code = Some(code);
            }
        }
        *exit_code
    }

    /// Threads cannot be killed; closing stdin is the only signal we have.
    pub(super) fn close_input(&self) {
        lock(&self.stdin).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn table_lists_sorted_names() {
        let mut table = InvocationTable::new();
        table.register("echo", |_ctx: InvocationContext| -> anyhow::Result<()> { Ok(()) });
        table.register("cat", |_ctx: InvocationContext| -> anyhow::Result<()> { Ok(()) });
        assert_eq!(table.names(), vec!["cat".to_string(), "echo".to_string()]);
        assert!(table.get("cat").is_some());
        assert!(table.get("ls").is_none());
    }

    #[test]
    fn entry_point_sees_args_and_private_streams() {
        let entry: Arc<dyn EntryPoint> = Arc::new(|mut ctx: InvocationContext| -> anyhow::Result<()> {
            let mut input = String::new();
            ctx.stdin.read_to_string(&mut input)?;
            write!(ctx.stdout, "{}:{}", ctx.args.join(","), input.to_uppercase())?;
            Ok(())
        });
        let params = StartParams {
            version_info: "test".into(),
            ..StartParams::default()
        };
        let (inferior, mut streams) =
            InvocationInferior::spawn("shout", entry, &["a".into(), "b".into()], &params).unwrap();
        inferior.write(b"hello").unwrap();
        inferior.close_input();

        let mut out = String::new();
        streams.stdout.read_to_string(&mut out).unwrap();
        assert_eq!(out, "a,b:HELLO");

        while inferior.try_wait().is_none() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(inferior.try_wait(), Some(0));
    }

    #[test]
    fn failing_entry_point_reports_on_stderr() {
        let entry: Arc<dyn EntryPoint> = Arc::new(|_ctx: InvocationContext| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        });
        let (inferior, mut streams) =
            InvocationInferior::spawn("broken", entry, &[], &StartParams::default()).unwrap();

        let mut err = String::new();
        streams.stderr.as_mut().unwrap().read_to_string(&mut err).unwrap();
        assert_eq!(err, "broken: boom\n");

        while inferior.try_wait().is_none() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(inferior.try_wait(), Some(1));
    }
}
