//! Wire protocol for ttyrelay sessions
//!
//! This crate holds everything that defines the byte/character stream shared by
//! a backend and a remote renderer: the escape sequences written towards the
//! renderer, the sentinel-delimited event records read from it, the quoting used
//! for event payloads, and the modular counters used for flow control.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod escape;
pub mod event;
pub mod flow;
pub mod input;
pub mod json_string;
pub mod utf8;

pub use event::{Event, WindowSize};
pub use input::{split_handshake, InputAssembler, InputItem};
pub use json_string::{parse_json_string, quote_json_string};
pub use utf8::Utf8Decoder;

// ============================================================================
// Constants
// ============================================================================

/// Introduces an inline event record in the input stream (U+0092, "Private Use Two").
pub const EVENT_SENTINEL: char = '\u{92}';

/// Prefix of the optional handshake line at the start of a session.
pub const HANDSHAKE_PREFIX: &str = "VERSION=";

/// Default backlog (in bytes) after which output writers are suspended.
pub const DEFAULT_HIGH_WATER_MARK: u32 = 3000;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed string literal: {0}")]
    BadString(String),
    #[error("expected {expected} integer fields in {event} payload, got {payload:?}")]
    BadFieldCount {
        event: &'static str,
        expected: usize,
        payload: String,
    },
    #[error("invalid integer {value:?} in {event} payload")]
    BadInteger { event: &'static str, value: String },
}

// ============================================================================
// Line editing
// ============================================================================

/// How the renderer should treat keyboard input for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEditingMode {
    /// Renderer decides from the inferior's terminal mode.
    #[default]
    Auto,
    /// Renderer edits a whole line before sending it.
    Line,
    /// Every keystroke is sent as it is typed.
    Character,
    /// Input is passed through without local editing.
    PassThrough,
}

impl LineEditingMode {
    /// The single-letter code used on the wire.
    pub fn code(self) -> char {
        match self {
            LineEditingMode::Auto => 'a',
            LineEditingMode::Line => 'l',
            LineEditingMode::Character => 'c',
            LineEditingMode::PassThrough => 'p',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'a' => Some(LineEditingMode::Auto),
            'l' => Some(LineEditingMode::Line),
            'c' => Some(LineEditingMode::Character),
            'p' => Some(LineEditingMode::PassThrough),
            _ => None,
        }
    }
}

impl std::fmt::Display for LineEditingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineEditingMode::Auto => write!(f, "auto"),
            LineEditingMode::Line => write!(f, "line"),
            LineEditingMode::Character => write!(f, "character"),
            LineEditingMode::PassThrough => write!(f, "pass-through"),
        }
    }
}
