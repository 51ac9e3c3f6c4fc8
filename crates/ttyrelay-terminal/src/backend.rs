/// Backend: one inferior seen as a session stream
use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};
use ttyrelay_protocol::{escape, Event, LineEditingMode, WindowSize};

use crate::inferior::{
    Inferior, InferiorError, InferiorKind, InferiorSpec, StartParams, MODE_CANONICAL, MODE_ECHO,
};
use crate::link::{checked_link, LinkOpener, LogLinkOpener};
use crate::lock;
use crate::logger::TranscriptLogger;
use crate::relay::{Relay, SinkSlot, Stream};
use crate::sink::{OutputSink, SinkError};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to start inferior: {0}")]
    Start(#[source] InferiorError),

    #[error("writing to inferior failed: {0}")]
    Io(#[source] InferiorError),

    #[error("inferior has not been started")]
    NotStarted,

    #[error("unknown entry point '{0}'")]
    UnknownEntryPoint(String),

    #[error("failed to spawn {what} thread: {source}")]
    Thread {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Per-backend settings that do not depend on the inferior variant.
#[derive(Clone)]
pub struct BackendOptions {
    /// Above zero, every input and event is traced at debug level.
    pub verbosity: u8,
    /// Overrides the variant's default line-editing mode.
    pub line_editing_mode: Option<LineEditingMode>,
    pub link_opener: Arc<dyn LinkOpener>,
    pub transcript: Option<Arc<TranscriptLogger>>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            verbosity: 0,
            line_editing_mode: None,
            link_opener: Arc::new(LogLinkOpener),
            transcript: None,
        }
    }
}

/// Owns one inferior and translates between its bytes and the session stream.
pub struct Backend {
    name: String,
    spec: InferiorSpec,
    verbosity: u8,
    line_editing_mode: Mutex<LineEditingMode>,
    version_info: Mutex<Vec<String>>,
    sink: Arc<SinkSlot>,
    inferior: Mutex<Option<Arc<Inferior>>>,
    window_size: Mutex<Option<WindowSize>>,
    link_opener: Arc<dyn LinkOpener>,
    transcript: Option<Arc<TranscriptLogger>>,
}

impl Backend {
    pub fn new(name: impl Into<String>, spec: InferiorSpec, options: BackendOptions) -> Self {
        let mode = options
            .line_editing_mode
            .unwrap_or_else(|| spec.kind().default_line_editing_mode());
        Self {
            name: name.into(),
            spec,
            verbosity: options.verbosity,
            line_editing_mode: Mutex::new(mode),
            version_info: Mutex::new(Vec::new()),
            sink: Arc::new(SinkSlot::default()),
            inferior: Mutex::new(None),
            window_size: Mutex::new(None),
            link_opener: options.link_opener,
            transcript: options.transcript,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> InferiorKind {
        self.spec.kind()
    }

    pub fn spec(&self) -> &InferiorSpec {
        &self.spec
    }

    pub fn is_started(&self) -> bool {
        lock(&self.inferior).is_some()
    }

    fn inferior(&self) -> Option<Arc<Inferior>> {
        lock(&self.inferior).clone()
    }

    /// Attach `sink` and, on the first call, start the inferior.
    ///
    /// Later calls only swap the sink: output from the running inferior goes
    /// to the newest one.
    pub fn run(&self, sink: Arc<OutputSink>) -> Result<(), BackendError> {
        if self.sink.attach(Arc::clone(&sink)).is_some() {
            debug!(session = %self.name, "output sink replaced");
        }

        let mut slot = lock(&self.inferior);
        if slot.is_some() {
            return Ok(());
        }

        let kind = self.kind();
        self.add_version_info(kind.version_tag());
        let mut params = StartParams {
            version_info: self.version_info(),
            ..StartParams::default()
        };
        if let Some(size) = *lock(&self.window_size) {
            params.size = size;
        }

        let (inferior, streams) = Inferior::start(&self.spec, &params).map_err(BackendError::Start)?;
        let inferior = Arc::new(inferior);
        *slot = Some(Arc::clone(&inferior));
        drop(slot);
        info!(
            session = %self.name,
            kind = %kind,
            command = %self.spec.describe(),
            version = %params.version_info,
            "inferior started"
        );
        if let Some(transcript) = &self.transcript {
            let _ = transcript.log_event("start", &self.spec.describe());
        }

        let mode = *lock(&self.line_editing_mode);
        sink.write_unthrottled(&escape::line_editing_mode(mode))?;
        if kind != InferiorKind::Pty {
            sink.write_unthrottled(escape::auto_newline(true))?;
        }
        sink.write_unthrottled(&escape::session_name(&self.name))?;

        let relay = Relay {
            session: self.name.clone(),
            slot: Arc::clone(&self.sink),
            inferior: Arc::clone(&inferior),
            transcript: self.transcript.clone(),
        };
        let spawned = Self::spawn_relay(relay, streams);
        if spawned.is_err() {
            inferior.terminate();
        }
        spawned
    }

    fn spawn_relay(
        relay: Relay,
        streams: crate::inferior::OutputStreams,
    ) -> Result<(), BackendError> {
        let thread_error = |source| BackendError::Thread {
            what: "output copy",
            source,
        };
        let mut copies = vec![relay
            .spawn_copy(Stream::Stdout, streams.stdout)
            .map_err(thread_error)?];
        if let Some(stderr) = streams.stderr {
            copies.push(relay.spawn_copy(Stream::Stderr, stderr).map_err(thread_error)?);
        }
        relay
            .spawn_reaper(copies)
            .map_err(|source| BackendError::Thread {
                what: "reaper",
                source,
            })?;
        Ok(())
    }

    /// Send literal input text to the inferior.
    ///
    /// Carriage returns become newlines, except for a PTY in raw mode, where
    /// full-screen programs expect to see CR for Enter.
    pub fn process_input_characters(&self, text: &str) -> Result<(), BackendError> {
        if text.is_empty() {
            return Ok(());
        }
        let inferior = self.inferior().ok_or(BackendError::NotStarted)?;
        let raw_pty =
            inferior.kind() == InferiorKind::Pty && inferior.mode_bits() & MODE_CANONICAL == 0;
        let text: Cow<'_, str> = if raw_pty {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.replace('\r', "\n"))
        };

        if self.verbosity > 0 {
            debug!(session = %self.name, input = ?text, "input");
        }
        if let Some(transcript) = &self.transcript {
            let _ = transcript.log_input(&text);
        }
        inferior.write_input(text.as_bytes()).map_err(BackendError::Io)
    }

    /// Handle a named event from the renderer. Malformed payloads are logged
    /// and dropped; only failing to write to the inferior is an error.
    pub fn report_event(&self, name: &str, payload: &str) -> Result<(), BackendError> {
        if self.verbosity > 0 {
            debug!(session = %self.name, event = name, payload, "event");
        }
        let event = match Event::parse(name, payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(session = %self.name, event = name, "dropping malformed event: {}", e);
                return Ok(());
            }
        };
        match event {
            Event::Key { raw, text } => self.handle_key(&raw, &text),
            Event::WindowSize(size) => {
                self.set_window_size(size.rows, size.cols, size.pixel_width, size.pixel_height);
                Ok(())
            }
            Event::OpenLink(href) => {
                self.open_link(&href);
                Ok(())
            }
            Event::Version(version) => {
                self.add_version_info(&version);
                Ok(())
            }
            Event::Received(count) => {
                // Confirmations normally go straight to the sink.
                if let Some(sink) = self.sink.current() {
                    sink.update_confirmed(count);
                }
                Ok(())
            }
            Event::Unknown { name, .. } => {
                debug!(session = %self.name, event = %name, "ignoring unknown event");
                Ok(())
            }
        }
    }

    fn handle_key(&self, raw: &str, text: &str) -> Result<(), BackendError> {
        let interrupt_or_eof = matches!(text, "\u{3}" | "\u{4}");
        if self.is_canonical_mode() && !interrupt_or_eof {
            // The renderer does the line editing; hand the key back to it.
            let echo = escape::key_echo(raw, self.is_echoing_mode());
            if let Some(sink) = self.sink.current() {
                sink.write_unthrottled(&echo)?;
            }
            return Ok(());
        }
        self.process_input_characters(text)
    }

    /// Resize the PTY, or remember the size until the inferior starts.
    pub fn set_window_size(&self, rows: u16, cols: u16, pixel_width: u16, pixel_height: u16) {
        let size = WindowSize {
            rows,
            cols,
            pixel_width,
            pixel_height,
        };
        *lock(&self.window_size) = Some(size);
        if let Some(transcript) = &self.transcript {
            let _ = transcript.log_resize(size);
        }
        if let Some(inferior) = self.inferior() {
            if let Err(e) = inferior.resize(size) {
                warn!(session = %self.name, "resize failed: {}", e);
            }
        }
    }

    pub fn window_size(&self) -> Option<WindowSize> {
        *lock(&self.window_size)
    }

    /// True unless the inferior is a PTY in non-canonical mode.
    pub fn is_canonical_mode(&self) -> bool {
        self.inferior()
            .map_or(true, |inferior| inferior.mode_bits() & MODE_CANONICAL != 0)
    }

    pub fn is_echoing_mode(&self) -> bool {
        self.inferior()
            .map_or(true, |inferior| inferior.mode_bits() & MODE_ECHO != 0)
    }

    pub fn line_editing_mode(&self) -> LineEditingMode {
        *lock(&self.line_editing_mode)
    }

    pub fn add_version_info(&self, info: &str) {
        if info.is_empty() {
            return;
        }
        lock(&self.version_info).push(info.to_string());
        if let Some(transcript) = &self.transcript {
            let _ = transcript.log_event("version", info);
        }
    }

    /// Everything added so far, joined with `;`.
    pub fn version_info(&self) -> String {
        lock(&self.version_info).join(";")
    }

    fn open_link(&self, href: &str) {
        let uri = checked_link(href).to_string();
        if uri != href {
            warn!(session = %self.name, href, "invalid link target");
        }
        let opener = Arc::clone(&self.link_opener);
        let session = self.name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-link", self.name))
            .spawn(move || {
                if let Err(e) = opener.open(&uri) {
                    warn!(session = %session, uri = %uri, "failed to open link: {:#}", e);
                }
            });
        if let Err(e) = spawned {
            warn!(session = %self.name, "failed to spawn link opener: {}", e);
        }
    }

    /// Exit code of the inferior, once it has exited.
    pub fn exit_code(&self) -> Option<i32> {
        self.inferior().and_then(|inferior| inferior.try_wait())
    }

    /// Stop the inferior. Its copy threads then see end-of-stream.
    pub fn shutdown(&self) {
        if let Some(inferior) = self.inferior() {
            info!(session = %self.name, "shutting down inferior");
            inferior.terminate();
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Some(inferior) = lock(&self.inferior).take() {
            inferior.terminate();
        }
    }
}
