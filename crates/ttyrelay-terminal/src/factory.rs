use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;
use ttyrelay_protocol::LineEditingMode;

use crate::backend::{Backend, BackendError, BackendOptions};
use crate::inferior::{InferiorError, InferiorKind, InferiorSpec, InvocationTable};
use crate::link::LinkOpener;
use crate::logger::TranscriptLogger;

/// Builds the backend for each new session from one configured template.
#[derive(Clone)]
pub struct BackendFactory {
    kind: InferiorKind,
    command: Vec<String>,
    env: Vec<(String, String)>,
    entry: Option<String>,
    invocations: InvocationTable,
    options: BackendOptions,
    transcript_dir: Option<PathBuf>,
}

impl BackendFactory {
    pub fn new(kind: InferiorKind) -> Self {
        Self {
            kind,
            command: Vec::new(),
            env: Vec::new(),
            entry: None,
            invocations: InvocationTable::new(),
            options: BackendOptions::default(),
            transcript_dir: None,
        }
    }

    pub fn kind(&self) -> InferiorKind {
        self.kind
    }

    /// Program and arguments; for invocations, the arguments only.
    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn invocations(mut self, table: InvocationTable) -> Self {
        self.invocations = table;
        self
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.options.verbosity = verbosity;
        self
    }

    pub fn line_editing_mode(mut self, mode: LineEditingMode) -> Self {
        self.options.line_editing_mode = Some(mode);
        self
    }

    pub fn link_opener(mut self, opener: Arc<dyn LinkOpener>) -> Self {
        self.options.link_opener = opener;
        self
    }

    pub fn transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = Some(dir.into());
        self
    }

    /// A backend for the session called `name`. Nothing is started yet.
    pub fn create(&self, name: &str) -> Result<Backend, BackendError> {
        let spec = match self.kind {
            InferiorKind::Pty => InferiorSpec::Pty {
                command: self.command.clone(),
                env: self.env.clone(),
            },
            InferiorKind::Process => {
                if self.command.is_empty() {
                    return Err(BackendError::Start(InferiorError::EmptyCommand));
                }
                InferiorSpec::Process {
                    command: self.command.clone(),
                    env: self.env.clone(),
                }
            }
            InferiorKind::Invocation => {
                let entry_name = self.entry.clone().unwrap_or_default();
                let entry = self
                    .invocations
                    .get(&entry_name)
                    .ok_or(BackendError::UnknownEntryPoint(entry_name.clone()))?;
                InferiorSpec::Invocation {
                    name: entry_name,
                    entry,
                    args: self.command.clone(),
                }
            }
        };

        let mut options = self.options.clone();
        if let Some(dir) = &self.transcript_dir {
            match TranscriptLogger::create(dir, name) {
                Ok(logger) => options.transcript = Some(Arc::new(logger)),
                Err(e) => warn!(session = name, "transcript disabled: {:#}", e),
            }
        }
        Ok(Backend::new(name, spec, options))
    }
}

impl std::fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFactory")
            .field("kind", &self.kind)
            .field("command", &self.command)
            .field("entry", &self.entry)
            .field("invocations", &self.invocations)
            .field("transcript_dir", &self.transcript_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inferior::InvocationContext;

    #[test]
    fn process_needs_a_command() {
        let factory = BackendFactory::new(InferiorKind::Process);
        assert!(matches!(
            factory.create("s-1"),
            Err(BackendError::Start(InferiorError::EmptyCommand))
        ));
    }

    #[test]
    fn invocation_resolves_entry_by_name() {
        let mut table = InvocationTable::new();
        table.register("noop", |_ctx: InvocationContext| -> anyhow::Result<()> { Ok(()) });

        let factory = BackendFactory::new(InferiorKind::Invocation)
            .invocations(table)
            .entry("noop")
            .command(vec!["x".into()]);
        let backend = factory.create("s-1").unwrap();
        assert_eq!(backend.kind(), InferiorKind::Invocation);
        assert_eq!(backend.spec().describe(), "noop x");

        let missing = factory.clone().entry("nope");
        assert!(matches!(
            missing.create("s-2"),
            Err(BackendError::UnknownEntryPoint(name)) if name == "nope"
        ));
    }

    #[test]
    fn line_editing_mode_overrides_the_kind_default() {
        let factory = BackendFactory::new(InferiorKind::Process).command(vec!["cat".into()]);
        assert_eq!(
            factory.create("s-1").unwrap().line_editing_mode(),
            LineEditingMode::PassThrough
        );

        let backend = factory
            .line_editing_mode(LineEditingMode::Character)
            .create("s-2")
            .unwrap();
        assert_eq!(backend.line_editing_mode(), LineEditingMode::Character);
    }

    #[test]
    fn transcript_is_created_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let factory = BackendFactory::new(InferiorKind::Pty).transcript_dir(dir.path());
        let backend = factory.create("tty-7").unwrap();
        backend.add_version_info("r1");
        assert!(dir.path().join("session-tty-7.jsonl").exists());
    }
}
