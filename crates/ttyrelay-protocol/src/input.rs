//! Splitting renderer input into literal text and event records.
//!
//! A record is `U+0092 NAME SP payload LF`. Transports deliver input in chunks
//! whose boundaries can fall anywhere, including inside a record, so the
//! assembler keeps an unfinished record until its `LF` arrives.

use crate::{EVENT_SENTINEL, HANDSHAKE_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputItem {
    /// Literal text for the inferior.
    Text(String),
    Event { name: String, payload: String },
}

#[derive(Debug, Default)]
pub struct InputAssembler {
    /// Unfinished record, starting with the sentinel.
    partial: String,
    /// Opening input held until its handshake is terminated.
    opening: String,
}

impl InputAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a record is waiting for its terminating newline.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Feed one chunk and return the items it completes, in stream order.
    pub fn push(&mut self, chunk: &str) -> Vec<InputItem> {
        let owned;
        let mut rest: &str = if self.partial.is_empty() {
            chunk
        } else {
            self.partial.push_str(chunk);
            owned = std::mem::take(&mut self.partial);
            &owned
        };

        let mut items = Vec::new();
        loop {
            let Some(start) = rest.find(EVENT_SENTINEL) else {
                if !rest.is_empty() {
                    items.push(InputItem::Text(rest.to_string()));
                }
                break;
            };
            if start > 0 {
                items.push(InputItem::Text(rest[..start].to_string()));
            }
            let body = &rest[start + EVENT_SENTINEL.len_utf8()..];
            let Some(eol) = body.find('\n') else {
                self.partial = rest[start..].to_string();
                break;
            };
            let record = &body[..eol];
            let (name, payload) = match record.find(' ') {
                Some(sp) => (&record[..sp], record[sp..].trim_start_matches(' ')),
                None => (record, ""),
            };
            items.push(InputItem::Event {
                name: name.to_string(),
                payload: payload.to_string(),
            });
            rest = &body[eol + 1..];
        }
        items
    }

    /// Collect the opening input of a session until its handshake is complete.
    ///
    /// Returns the version, if one was sent, and the input that followed it.
    /// Returns `None` while a handshake has begun but its terminator has not
    /// arrived. With `at_end` the input collected so far is all there is.
    pub fn take_handshake(&mut self, chunk: &str, at_end: bool) -> Option<(Option<String>, String)> {
        self.opening.push_str(chunk);
        let (version, rest) = split_handshake(&self.opening, at_end)?;
        let rest = rest.to_string();
        self.opening.clear();
        Some((version, rest))
    }
}

/// Separate an optional version handshake from the first input of a session.
///
/// Two forms are accepted: a `VERSION=` line (ended by `LF`, which is consumed,
/// or by an event sentinel, which is kept) and a complete `VERSION` event
/// record at the very start.
///
/// Returns `None` when `chunk` starts a handshake without finishing it. If
/// `at_end` is set no more opening input will follow: an unterminated
/// `VERSION=` line then runs to the end of the chunk.
pub fn split_handshake(chunk: &str, at_end: bool) -> Option<(Option<String>, &str)> {
    if let Some(body) = chunk.strip_prefix(HANDSHAKE_PREFIX) {
        return match body.find(['\n', EVENT_SENTINEL]) {
            Some(i) if body[i..].starts_with('\n') => {
                Some((Some(body[..i].to_string()), &body[i + 1..]))
            }
            Some(i) => Some((Some(body[..i].to_string()), &body[i..])),
            None if at_end => Some((Some(body.to_string()), "")),
            None => None,
        };
    }
    let record_prefix = format!("{EVENT_SENTINEL}VERSION ");
    if let Some(body) = chunk.strip_prefix(record_prefix.as_str()) {
        return match body.find('\n') {
            Some(eol) => Some((Some(body[..eol].to_string()), &body[eol + 1..])),
            // Left to the assembler as an ordinary unfinished record.
            None if at_end => Some((None, chunk)),
            None => None,
        };
    }
    let begun = !chunk.is_empty()
        && (HANDSHAKE_PREFIX.starts_with(chunk) || record_prefix.starts_with(chunk));
    if begun && !at_end {
        return None;
    }
    Some((None, chunk))
}
