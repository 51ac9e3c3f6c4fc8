use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use ttyrelay_protocol::{Event, InputItem};

use crate::backend::BackendError;
use crate::factory::BackendFactory;
use crate::session::{Session, SessionId, SessionInfo};
use crate::sink::{Delivery, OutputSink, SinkConfig};
use crate::{lock, MAX_CONCURRENT_SESSIONS};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("maximum concurrent sessions ({0}) reached")]
    TooManySessions(usize),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Session names are `<prefix>-<id>`.
    pub name_prefix: String,
    pub max_sessions: usize,
    pub sink: SinkConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name_prefix: "ttyrelay".to_string(),
            max_sessions: MAX_CONCURRENT_SESSIONS,
            sink: SinkConfig::default(),
        }
    }
}

/// All live sessions, keyed by ID
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
    factory: BackendFactory,
    config: RegistryConfig,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("factory", &self.factory)
            .field("config", &self.config)
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(factory: BackendFactory, config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            factory,
            config,
        }
    }

    pub fn factory(&self) -> &BackendFactory {
        &self.factory
    }

    /// Create a session whose backend is built but not started.
    ///
    /// `transport` names the binding and is added to the version string when
    /// the inferior starts.
    pub fn open(&self, delivery: Delivery, transport: &str) -> Result<SessionId, RegistryError> {
        if self.len() >= self.config.max_sessions {
            return Err(RegistryError::TooManySessions(self.config.max_sessions));
        }

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = format!("{}-{}", self.config.name_prefix, id);
        let backend = self.factory.create(&name)?;
        let sink = Arc::new(OutputSink::new(delivery, self.config.sink));
        let session = Arc::new(Session::new(id, transport, backend, sink));

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.len() >= self.config.max_sessions {
            return Err(RegistryError::TooManySessions(self.config.max_sessions));
        }
        sessions.insert(id, session);
        drop(sessions);

        info!(session = %id, name = %name, transport, "session opened");
        Ok(id)
    }

    /// Open a session and start it right away with `first_input`, which may
    /// begin with a version handshake. The handshake ends with `first_input`
    /// even without a terminating newline.
    pub fn open_and_start(
        &self,
        delivery: Delivery,
        transport: &str,
        first_input: &str,
    ) -> Result<SessionId, RegistryError> {
        let id = self.open(delivery, transport)?;
        // A failed start has already removed the session.
        self.deliver(id, first_input, true)?;
        Ok(id)
    }

    /// Feed a chunk of renderer input to a session, starting it first if needed.
    ///
    /// A handshake split across chunks is held until its newline arrives; the
    /// session starts then. Any error is fatal for the session: it is closed
    /// before returning.
    pub fn deliver_input(&self, id: SessionId, chunk: &str) -> Result<(), RegistryError> {
        self.deliver(id, chunk, false)
    }

    fn deliver(&self, id: SessionId, chunk: &str, at_end: bool) -> Result<(), RegistryError> {
        let session = self.get(id)?;
        let result = Self::feed(&session, chunk, at_end);
        if let Err(e) = &result {
            error!(session = %id, "closing session: {}", e);
            let _ = self.close(id);
        }
        result
    }

    fn feed(session: &Session, chunk: &str, at_end: bool) -> Result<(), RegistryError> {
        let items = {
            let mut input = lock(&session.input);
            if session.backend.is_started() {
                input.push(chunk)
            } else {
                let Some((version, rest)) = input.take_handshake(chunk, at_end) else {
                    debug!(session = %session.id(), "handshake incomplete, not starting yet");
                    return Ok(());
                };
                if let Some(version) = version {
                    session.backend.add_version_info(&version);
                }
                session.backend.add_version_info(session.transport());
                session.backend.run(Arc::clone(&session.sink))?;
                input.push(&rest)
            }
        };

        // Confirmations skip the write lock: the writer holding it may be
        // blocked on an inferior that waits for this very confirmation.
        let mut ordered = Vec::with_capacity(items.len());
        for item in items {
            match item {
                InputItem::Event { name, payload } if name == "RECEIVED" => {
                    match Event::parse(&name, &payload) {
                        Ok(Event::Received(count)) => session.sink.update_confirmed(count),
                        Ok(_) => {}
                        Err(e) => warn!(session = %session.id(), "dropping malformed RECEIVED: {}", e),
                    }
                }
                item => ordered.push(item),
            }
        }
        if ordered.is_empty() {
            return Ok(());
        }

        let _writer = lock(&session.writer);
        for item in ordered {
            match item {
                InputItem::Text(text) => session.backend.process_input_characters(&text)?,
                InputItem::Event { name, payload } => session.backend.report_event(&name, &payload)?,
            }
        }
        Ok(())
    }

    /// Take the buffered output of a poll-delivery session and whether the
    /// output has ended.
    pub fn drain_output(&self, id: SessionId) -> Result<(String, bool), RegistryError> {
        let session = self.get(id)?;
        // Read the flag first so a closed result always carries the end marker.
        let closed = session.sink.is_closed();
        Ok((session.sink.drain(), closed))
    }

    /// Remove a session, end its output stream and stop its inferior.
    pub fn close(&self, id: SessionId) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        session.sink.close();
        session.backend.shutdown();
        info!(session = %id, "session closed");
        Ok(())
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownSession(id))
    }

    /// All sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every session, e.g. on server shutdown.
    pub fn close_all(&self) {
        let ids: Vec<SessionId> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        for id in ids {
            if self.close(id).is_err() {
                debug!(session = %id, "already closed");
            }
        }
    }
}
