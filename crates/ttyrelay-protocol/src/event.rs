//! Typed view of the named events carried in event records.

use serde::{Deserialize, Serialize};

use crate::flow::MASK28;
use crate::json_string::parse_json_string;
use crate::ProtocolError;

/// Terminal dimensions reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    /// Parse a `WS` payload: rows, columns, pixel width, pixel height.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = payload.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(ProtocolError::BadFieldCount {
                event: "WS",
                expected: 4,
                payload: payload.to_string(),
            });
        }
        let field = |i: usize| -> Result<u16, ProtocolError> {
            fields[i].parse().map_err(|_| ProtocolError::BadInteger {
                event: "WS",
                value: fields[i].to_string(),
            })
        };
        Ok(Self {
            rows: field(0)?,
            cols: field(1)?,
            pixel_width: field(2)?,
            pixel_height: field(3)?,
        })
    }
}

/// An event record decoded from its name and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A single logical keystroke. `raw` is the payload as received, still quoted.
    Key { raw: String, text: String },
    WindowSize(WindowSize),
    /// A link the user activated in the renderer.
    OpenLink(String),
    Version(String),
    /// Renderer acknowledges this many bytes of output (mod 2^28).
    Received(u32),
    Unknown { name: String, payload: String },
}

impl Event {
    pub fn parse(name: &str, payload: &str) -> Result<Self, ProtocolError> {
        match name {
            "KEY" => Ok(Event::Key {
                raw: payload.to_string(),
                text: parse_json_string(from_first_quote(payload))?,
            }),
            "WS" => WindowSize::parse(payload).map(Event::WindowSize),
            "ALINK" => parse_json_string(from_first_quote(payload)).map(Event::OpenLink),
            "VERSION" => Ok(Event::Version(payload.to_string())),
            "RECEIVED" => {
                let count: u64 = payload.trim().parse().map_err(|_| ProtocolError::BadInteger {
                    event: "RECEIVED",
                    value: payload.to_string(),
                })?;
                Ok(Event::Received((count & MASK28 as u64) as u32))
            }
            _ => Ok(Event::Unknown {
                name: name.to_string(),
                payload: payload.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Event::Key { .. } => "KEY",
            Event::WindowSize(_) => "WS",
            Event::OpenLink(_) => "ALINK",
            Event::Version(_) => "VERSION",
            Event::Received(_) => "RECEIVED",
            Event::Unknown { name, .. } => name,
        }
    }
}

// KEY and ALINK payloads may carry extra fields in front of the string.
fn from_first_quote(payload: &str) -> &str {
    match payload.find(['"', '\'']) {
        Some(i) => &payload[i..],
        None => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_window_size_fields() {
        let ws = WindowSize::parse("24 80  640 480").unwrap();
        assert_eq!(
            ws,
            WindowSize {
                rows: 24,
                cols: 80,
                pixel_width: 640,
                pixel_height: 480
            }
        );
    }

    #[test]
    fn rejects_bad_window_size() {
        assert!(matches!(
            WindowSize::parse("24 80 640"),
            Err(ProtocolError::BadFieldCount { .. })
        ));
        assert!(matches!(
            WindowSize::parse("24 eighty 640 480"),
            Err(ProtocolError::BadInteger { .. })
        ));
    }

    #[test]
    fn key_keeps_raw_payload() {
        let ev = Event::parse("KEY", "13 \"\\r\"").unwrap();
        assert_eq!(
            ev,
            Event::Key {
                raw: "13 \"\\r\"".into(),
                text: "\r".into()
            }
        );
    }

    #[test]
    fn received_is_masked() {
        assert_eq!(
            Event::parse("RECEIVED", "268435457").unwrap(),
            Event::Received(1)
        );
        assert!(Event::parse("RECEIVED", "lots").is_err());
    }

    #[test]
    fn unknown_names_pass_through() {
        let ev = Event::parse("FOCUS", "1").unwrap();
        assert_eq!(ev.name(), "FOCUS");
    }
}
