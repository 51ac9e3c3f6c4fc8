use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use ttyrelay_protocol::InputAssembler;

use crate::backend::Backend;
use crate::inferior::InferiorKind;
use crate::sink::OutputSink;

/// Session ID, rendered as a decimal string on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Snapshot of a session for listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub kind: InferiorKind,
    pub command: String,
    pub transport: String,
    pub version_info: String,
    pub started: bool,
    pub closed: bool,
    pub backlog: u32,
    pub created_at: DateTime<Utc>,
}

/// A backend bound to its output sink and input assembler
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    transport: String,
    pub(crate) backend: Backend,
    pub(crate) sink: Arc<OutputSink>,
    pub(crate) input: Mutex<InputAssembler>,
    /// Held while a chunk's items go to the inferior, so chunks do not interleave.
    pub(crate) writer: Mutex<()>,
}

impl Session {
    pub(crate) fn new(id: SessionId, transport: &str, backend: Backend, sink: Arc<OutputSink>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            transport: transport.to_string(),
            backend,
            sink,
            input: Mutex::new(InputAssembler::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn sink(&self) -> &Arc<OutputSink> {
        &self.sink
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            name: self.backend.name().to_string(),
            kind: self.backend.kind(),
            command: self.backend.spec().describe(),
            transport: self.transport.clone(),
            version_info: self.backend.version_info(),
            started: self.backend.is_started(),
            closed: self.sink.is_closed(),
            backlog: self.sink.backlog(),
            created_at: self.created_at,
        }
    }
}
