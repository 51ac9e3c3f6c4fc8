//! Escape sequences written from a backend towards the renderer.

use crate::LineEditingMode;

pub const ESC: char = '\u{1b}';
pub const BEL: char = '\u{7}';

/// Start of a span of output that came from the inferior's error stream.
pub const START_ERROR_OUTPUT: &str = "\x1b[12u";
/// End of an error-output span.
pub const END_ERROR_OUTPUT: &str = "\x1b[11u";
/// Written once when a session's output ends.
pub const END_OF_STREAM: &str = "\x1b[99;99u";

pub const AUTO_NEWLINE_ON: &str = "\x1b[20h";
pub const AUTO_NEWLINE_OFF: &str = "\x1b[20l";

pub fn line_editing_mode(mode: LineEditingMode) -> String {
    format!("\x1b[80;{}u", mode.code() as u32)
}

pub fn auto_newline(enabled: bool) -> &'static str {
    if enabled {
        AUTO_NEWLINE_ON
    } else {
        AUTO_NEWLINE_OFF
    }
}

pub fn session_name(name: &str) -> String {
    format!("\x1b]30;{name}\x07")
}

/// Hands a keystroke back to the renderer for local line editing.
///
/// `payload` is the still-quoted JSON text of the original `KEY` event.
/// Code 74 asks the renderer to display the key, 73 to apply it silently.
pub fn key_echo(payload: &str, echoing: bool) -> String {
    let code = if echoing { 74 } else { 73 };
    format!("\x1b]{code};{payload}\x07")
}

/// Wraps error-stream text in error-span markers.
///
/// Line breaks stay outside the markers and a `\r\n` pair is never split, so
/// the renderer can close its error span before every line break.
pub fn wrap_error_output(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find(['\r', '\n']) {
            Some(0) => {
                let n = if rest.starts_with("\r\n") { 2 } else { 1 };
                out.push_str(&rest[..n]);
                rest = &rest[n..];
            }
            Some(i) => {
                push_error_span(&mut out, &rest[..i]);
                rest = &rest[i..];
            }
            None => {
                push_error_span(&mut out, rest);
                rest = "";
            }
        }
    }
    out
}

fn push_error_span(out: &mut String, text: &str) {
    out.push_str(START_ERROR_OUTPUT);
    out.push_str(text);
    out.push_str(END_ERROR_OUTPUT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_escape_uses_decimal_code() {
        assert_eq!(line_editing_mode(LineEditingMode::Auto), "\x1b[80;97u");
        assert_eq!(line_editing_mode(LineEditingMode::PassThrough), "\x1b[80;112u");
    }

    #[test]
    fn key_echo_keeps_payload_verbatim() {
        assert_eq!(key_echo("\"a\"", true), "\x1b]74;\"a\"\x07");
        assert_eq!(key_echo("\"a\"", false), "\x1b]73;\"a\"\x07");
    }

    #[test]
    fn session_name_is_osc_30() {
        assert_eq!(session_name("relay-1"), "\x1b]30;relay-1\x07");
    }

    #[test]
    fn error_wrapping_never_splits_crlf() {
        assert_eq!(
            wrap_error_output("oops\r\nbad\n"),
            "\x1b[12uoops\x1b[11u\r\n\x1b[12ubad\x1b[11u\n"
        );
        assert_eq!(wrap_error_output("\n\r"), "\n\r");
        assert_eq!(wrap_error_output(""), "");
    }
}
