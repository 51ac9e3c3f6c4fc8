//! JSON string literals as used in event payloads.
//!
//! Renderers produce these with `JSON.stringify`, but older ones quote with `'`,
//! so parsing is a little more lenient than strict JSON.

use crate::ProtocolError;

/// Quote `s` as a JSON string literal.
///
/// Everything outside printable ASCII is written as `\uXXXX` so the literal
/// survives any transport unchanged.
pub fn quote_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
    out
}

/// Parse the first string literal in `text`.
///
/// Leading whitespace is skipped; anything after the closing quote is ignored.
pub fn parse_json_string(text: &str) -> Result<String, ProtocolError> {
    let bad = |why: &str| ProtocolError::BadString(format!("{why} in {text:?}"));

    let mut chars = text.chars();
    let quote = loop {
        match chars.next() {
            Some(c @ ('"' | '\'')) => break c,
            Some(c) if c.is_whitespace() => continue,
            Some(_) => return Err(bad("missing opening quote")),
            None => return Err(bad("empty payload")),
        }
    };

    let mut out = String::new();
    let mut pending_high: Option<u16> = None;
    loop {
        let ch = chars.next().ok_or_else(|| bad("unterminated literal"))?;
        if ch == quote {
            break;
        }
        if ch != '\\' {
            if pending_high.take().is_some() {
                out.push(char::REPLACEMENT_CHARACTER);
            }
            out.push(ch);
            continue;
        }
        let esc = chars.next().ok_or_else(|| bad("dangling backslash"))?;
        if esc == 'u' {
            let mut unit: u16 = 0;
            for _ in 0..4 {
                let digit = chars
                    .next()
                    .and_then(|c| c.to_digit(16))
                    .ok_or_else(|| bad("bad \\u escape"))?;
                unit = (unit << 4) | digit as u16;
            }
            match (pending_high.take(), unit) {
                (Some(high), 0xDC00..=0xDFFF) => {
                    let combined = 0x10000
                        + (((high as u32) - 0xD800) << 10)
                        + ((unit as u32) - 0xDC00);
                    out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                (prev, 0xD800..=0xDBFF) => {
                    if prev.is_some() {
                        out.push(char::REPLACEMENT_CHARACTER);
                    }
                    pending_high = Some(unit);
                }
                (prev, _) => {
                    if prev.is_some() {
                        out.push(char::REPLACEMENT_CHARACTER);
                    }
                    out.push(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            continue;
        }
        if pending_high.take().is_some() {
            out.push(char::REPLACEMENT_CHARACTER);
        }
        out.push(match esc {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '\\' | '\'' | '"' | '/' => esc,
            other => return Err(bad(&format!("unknown escape \\{other}"))),
        });
    }
    if pending_high.is_some() {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_quote_styles() {
        assert_eq!(parse_json_string("\"a\"").unwrap(), "a");
        assert_eq!(parse_json_string("  'it\\'s'").unwrap(), "it's");
    }

    #[test]
    fn parses_standard_escapes() {
        assert_eq!(
            parse_json_string(r#""\n\r\t\b\f\\\"\u0003""#).unwrap(),
            "\n\r\t\u{8}\u{c}\\\"\u{3}"
        );
    }

    #[test]
    fn joins_surrogate_pairs() {
        assert_eq!(parse_json_string(r#""\ud83d\ude00""#).unwrap(), "😀");
        assert_eq!(parse_json_string(r#""\ud83dx""#).unwrap(), "\u{fffd}x");
    }

    #[test]
    fn rejects_malformed_literals() {
        assert!(parse_json_string("a").is_err());
        assert!(parse_json_string("\"abc").is_err());
        assert!(parse_json_string(r#""\u12""#).is_err());
        assert!(parse_json_string(r#""\q""#).is_err());
        assert!(parse_json_string("   ").is_err());
    }

    #[test]
    fn quoting_escapes_non_ascii() {
        assert_eq!(quote_json_string("é\u{3}\"x"), r#""\u00e9\u0003\"x""#);
        assert_eq!(quote_json_string("😀"), r#""\ud83d\ude00""#);
    }

    #[test]
    fn quote_then_parse_is_identity() {
        for s in ["", "plain", "tab\there", "\u{3}", "ünï©ødé 😀", "'\"\\"] {
            assert_eq!(parse_json_string(&quote_json_string(s)).unwrap(), s);
        }
    }
}
