//! Decodes the server's C-style quoted strings.
//!
//! The happy path (no backslashes) returns a borrow of the input; only once
//! a backslash is seen does a growing buffer get materialized.

use std::borrow::Cow;

use crate::error::{Error, Result};

/// Parses a leading `"…"` literal out of `input`.
///
/// Returns the decoded string and the number of bytes consumed, including
/// the surrounding quotes.
pub fn parse_quoted(input: &str) -> Result<(Cow<'_, str>, usize)> {
    let bytes = input.as_bytes();
    if bytes.first() != Some(&b'"') {
        return Err(Error::protocol_parse(0, "expected opening quote"));
    }

    let mut i = 1usize;
    let mut owned: Option<String> = None;

    loop {
        let Some(&b) = bytes.get(i) else {
            return Err(Error::protocol_parse(i, "unterminated quoted string"));
        };

        match b {
            b'"' => {
                i += 1;
                let decoded = match owned {
                    Some(s) => Cow::Owned(s),
                    // SAFETY-free: slice is valid UTF-8 because `input` is `&str`
                    // and the byte range [1, i-1) falls on char boundaries (no
                    // escape byte was seen on this path).
                    None => Cow::Borrowed(&input[1..i - 1]),
                };
                return Ok((decoded, i));
            }
            b'\\' => {
                let buf = owned.get_or_insert_with(|| input[1..i].to_string());
                i += 1;
                let Some(&esc) = bytes.get(i) else {
                    return Err(Error::protocol_parse(i, "truncated escape sequence"));
                };
                match esc {
                    b'\\' => {
                        buf.push('\\');
                        i += 1;
                    }
                    b'"' => {
                        buf.push('"');
                        i += 1;
                    }
                    b'f' => {
                        buf.push('\u{c}');
                        i += 1;
                    }
                    b'n' => {
                        buf.push('\n');
                        i += 1;
                    }
                    b'r' => {
                        buf.push('\r');
                        i += 1;
                    }
                    b't' => {
                        buf.push('\t');
                        i += 1;
                    }
                    b'0'..=b'3' => {
                        let octal = bytes
                            .get(i..i + 3)
                            .ok_or_else(|| Error::protocol_parse(i, "truncated octal escape"))?;
                        let value = parse_octal(octal, i)?;
                        buf.push(value as char);
                        i += 3;
                    }
                    other => {
                        return Err(Error::protocol_parse(
                            i,
                            format!("invalid escape sequence '\\{}'", other as char),
                        ));
                    }
                }
            }
            other => {
                if let Some(buf) = owned.as_mut() {
                    buf.push(other as char);
                }
                i += 1;
            }
        }
    }
}

fn parse_octal(digits: &[u8], offset: usize) -> Result<u8> {
    let mut value: u16 = 0;
    for (k, &d) in digits.iter().enumerate() {
        if !(b'0'..=b'7').contains(&d) {
            return Err(Error::protocol_parse(
                offset + k,
                "invalid octal digit in escape sequence",
            ));
        }
        value = value * 8 + u16::from(d - b'0');
    }
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_borrowed() {
        let (s, consumed) = parse_quoted(r#""hello world" trailer"#).unwrap();
        assert_eq!(s, "hello world");
        assert_eq!(consumed, 13);
        assert!(matches!(s, std::borrow::Cow::Borrowed(_)));
    }

    #[test]
    fn escapes_are_decoded() {
        let (s, consumed) = parse_quoted(r#""a\\b\"c\n\t\f\r""#).unwrap();
        assert_eq!(s, "a\\b\"c\n\t\u{c}\r");
        assert_eq!(consumed, r#""a\\b\"c\n\t\f\r""#.len());
        assert!(matches!(s, std::borrow::Cow::Owned(_)));
    }

    #[test]
    fn octal_escape() {
        let (s, _) = parse_quoted(r#""\101\102""#).unwrap();
        assert_eq!(s, "AB");
    }

    #[test]
    fn unterminated_literal_errors() {
        let err = parse_quoted(r#""no closing quote"#).unwrap_err();
        assert!(matches!(err, Error::ProtocolParse { .. }));
    }

    #[test]
    fn truncated_escape_errors() {
        let err = parse_quoted("\"abc\\").unwrap_err();
        assert!(matches!(err, Error::ProtocolParse { .. }));
    }

    #[test]
    fn invalid_octal_digit_errors() {
        // first digit in 0..=3 dispatches to octal parsing, but '8' is not a valid octal digit
        let err = parse_quoted(r#""\189""#).unwrap_err();
        assert!(matches!(err, Error::ProtocolParse { .. }));
    }

    #[test]
    fn missing_opening_quote_errors() {
        assert!(parse_quoted("no quote here").is_err());
    }
}
