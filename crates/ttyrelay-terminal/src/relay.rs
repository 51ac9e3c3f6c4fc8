//! Threads that move inferior output into the session's current sink.

use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};
use ttyrelay_protocol::escape::wrap_error_output;
use ttyrelay_protocol::Utf8Decoder;

use crate::inferior::Inferior;
use crate::lock;
use crate::logger::TranscriptLogger;
use crate::sink::{OutputSink, SinkError};

/// The sink a backend currently writes to. Re-attaching replaces it for all
/// copy threads at once.
#[derive(Debug, Default)]
pub(crate) struct SinkSlot {
    current: Mutex<Option<Arc<OutputSink>>>,
}

impl SinkSlot {
    pub(crate) fn attach(&self, sink: Arc<OutputSink>) -> Option<Arc<OutputSink>> {
        lock(&self.current).replace(sink)
    }

    pub(crate) fn current(&self) -> Option<Arc<OutputSink>> {
        lock(&self.current).clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn label(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// What the copy threads and the reaper of one inferior share.
#[derive(Clone)]
pub(crate) struct Relay {
    pub(crate) session: String,
    pub(crate) slot: Arc<SinkSlot>,
    pub(crate) inferior: Arc<Inferior>,
    pub(crate) transcript: Option<Arc<TranscriptLogger>>,
}

impl Relay {
    pub(crate) fn spawn_copy(
        &self,
        stream: Stream,
        mut reader: Box<dyn Read + Send>,
    ) -> std::io::Result<JoinHandle<()>> {
        let relay = self.clone();
        thread::Builder::new()
            .name(format!("{}-{}", self.session, stream.label()))
            .spawn(move || {
                let mut decoder = Utf8Decoder::new();
                let mut buffer = vec![0u8; 4096];
                loop {
                    let n = match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            // A PTY master reports EIO once the child is gone.
                            debug!(session = %relay.session, stream = stream.label(), "read ended: {}", e);
                            break;
                        }
                    };
                    let text = decoder.decode(&buffer[..n]);
                    if !relay.forward(stream, &text) {
                        return;
                    }
                }
                let tail = decoder.finish();
                relay.forward(stream, &tail);
            })
    }

    /// Returns false when copying should stop.
    fn forward(&self, stream: Stream, text: &str) -> bool {
        if text.is_empty() {
            return true;
        }
        if let Some(transcript) = &self.transcript {
            if let Err(e) = transcript.log_output(text) {
                debug!(session = %self.session, "transcript write failed: {:#}", e);
            }
        }
        let Some(sink) = self.slot.current() else {
            return true;
        };
        let result = match stream {
            Stream::Stdout => sink.write(text),
            Stream::Stderr => sink.write(&wrap_error_output(text)),
        };
        match result {
            Ok(()) => true,
            Err(SinkError::Stalled { backlog }) => {
                error!(session = %self.session, backlog, "renderer stopped confirming output, aborting session");
                sink.close();
                self.inferior.terminate();
                false
            }
            Err(e) => {
                debug!(session = %self.session, stream = stream.label(), "dropping output: {}", e);
                false
            }
        }
    }

    /// Join the copy threads, reap the inferior, then close whichever sink is
    /// attached at that point.
    pub(crate) fn spawn_reaper(self, copies: Vec<JoinHandle<()>>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("{}-reaper", self.session))
            .spawn(move || {
                for copy in copies {
                    if copy.join().is_err() {
                        warn!(session = %self.session, "output copy thread panicked");
                    }
                }
                let code = self.inferior.wait();
                info!(session = %self.session, exit_code = code, "inferior exited");
                if let Some(transcript) = &self.transcript {
                    let _ = transcript.log_event("exit", &code.to_string());
                }
                if let Some(sink) = self.slot.current() {
                    sink.close();
                }
            })
    }
}
