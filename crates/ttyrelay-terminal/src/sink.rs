//! Flow-controlled relay between a backend and one transport.
//!
//! Every byte handed to the transport advances `bytes_written`; the renderer
//! reports its progress with `RECEIVED`, which sets `bytes_confirmed`. Output
//! writers are suspended while the backlog between the two (mod 2^28) would
//! exceed the high-water mark.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use ttyrelay_protocol::escape::END_OF_STREAM;
use ttyrelay_protocol::flow::{self, MASK28};
use ttyrelay_protocol::DEFAULT_HIGH_WATER_MARK;

use crate::lock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("output sink is closed")]
    Closed,

    #[error("renderer stopped confirming output ({backlog} bytes outstanding)")]
    Stalled { backlog: u32 },

    #[error("transport receiver went away")]
    Disconnected,
}

/// How output reaches the transport.
#[derive(Debug)]
pub enum Delivery {
    /// Accumulate until the transport drains it (HTTP polling).
    Poll,
    /// Hand every write to the transport as it happens (WebSocket).
    Push(UnboundedSender<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    pub high_water_mark: u32,
    /// Give up on a suspended writer after this long. `None` waits forever.
    pub confirm_timeout: Option<Duration>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            confirm_timeout: None,
        }
    }
}

#[derive(Debug)]
struct SinkState {
    buffer: String,
    written: u32,
    confirmed: u32,
    closed: bool,
    push: Option<UnboundedSender<String>>,
}

#[derive(Debug)]
pub struct OutputSink {
    state: Mutex<SinkState>,
    confirmed_changed: Condvar,
    config: SinkConfig,
}

impl OutputSink {
    pub fn new(delivery: Delivery, config: SinkConfig) -> Self {
        let push = match delivery {
            Delivery::Poll => None,
            Delivery::Push(tx) => Some(tx),
        };
        Self {
            state: Mutex::new(SinkState {
                buffer: String::new(),
                written: 0,
                confirmed: 0,
                closed: false,
                push,
            }),
            confirmed_changed: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> SinkConfig {
        self.config
    }

    /// Write inferior output, suspending while the renderer is too far behind.
    ///
    /// A chunk bigger than the high-water mark goes through once the backlog
    /// has dropped to zero.
    pub fn write(&self, text: &str) -> Result<(), SinkError> {
        if text.is_empty() {
            return Ok(());
        }
        let len = text.len() as u64;
        let limit = self.config.high_water_mark as u64;
        let deadline = self.config.confirm_timeout.map(|t| Instant::now() + t);

        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return Err(SinkError::Closed);
            }
            let backlog = flow::backlog(state.written, state.confirmed);
            if backlog == 0 || backlog as u64 + len <= limit {
                break;
            }
            state = self.wait_for_confirmation(state, deadline, backlog)?;
        }
        Self::deliver(&mut state, text)
    }

    /// Write without waiting for confirmations. The bytes still count toward
    /// the backlog. Used for announcements and keystroke echoes, which come
    /// from the input path and must not block it.
    pub fn write_unthrottled(&self, text: &str) -> Result<(), SinkError> {
        if text.is_empty() {
            return Ok(());
        }
        let mut state = lock(&self.state);
        if state.closed {
            return Err(SinkError::Closed);
        }
        Self::deliver(&mut state, text)
    }

    /// Record a `RECEIVED` count from the renderer and wake every suspended writer.
    pub fn update_confirmed(&self, count: u32) {
        let mut state = lock(&self.state);
        state.confirmed = count & MASK28;
        drop(state);
        self.confirmed_changed.notify_all();
    }

    /// Take everything buffered so far (poll delivery).
    pub fn drain(&self) -> String {
        std::mem::take(&mut lock(&self.state).buffer)
    }

    /// Write the end-of-stream marker and refuse further output. Only the
    /// first call has any effect.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        let _ = Self::deliver(&mut state, END_OF_STREAM);
        state.closed = true;
        // Dropping the sender ends the transport's receive loop.
        state.push = None;
        drop(state);
        self.confirmed_changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn backlog(&self) -> u32 {
        let state = lock(&self.state);
        flow::backlog(state.written, state.confirmed)
    }

    pub fn bytes_written(&self) -> u32 {
        lock(&self.state).written
    }

    pub fn bytes_confirmed(&self) -> u32 {
        lock(&self.state).confirmed
    }

    fn deliver(state: &mut SinkState, text: &str) -> Result<(), SinkError> {
        state.written = flow::advance(state.written, text.len());
        match &state.push {
            Some(tx) => tx.send(text.to_string()).map_err(|_| SinkError::Disconnected),
            None => {
                state.buffer.push_str(text);
                Ok(())
            }
        }
    }

    fn wait_for_confirmation<'a>(
        &self,
        state: MutexGuard<'a, SinkState>,
        deadline: Option<Instant>,
        backlog: u32,
    ) -> Result<MutexGuard<'a, SinkState>, SinkError> {
        let Some(deadline) = deadline else {
            return Ok(self
                .confirmed_changed
                .wait(state)
                .unwrap_or_else(|e| e.into_inner()));
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SinkError::Stalled { backlog });
        }
        let (state, _) = self
            .confirmed_changed
            .wait_timeout(state, remaining)
            .unwrap_or_else(|e| e.into_inner());
        Ok(state)
    }
}
