//! Parses `[ v1,\tv2,\t… ]` result-row lines.

use crate::error::{Error, Result};
use crate::protocol::quoted::parse_quoted;

/// One decoded result row: raw column text, `None` for SQL NULL.
/// Conversion to host types is the literalizer's inverse and is left to the
/// wrapping relational API.
pub type Row = Vec<Option<String>>;

pub fn parse_row(line: &str) -> Result<Row> {
    let body = line
        .strip_prefix('[')
        .ok_or_else(|| Error::protocol_parse(0, "result row must begin with '['"))?;
    let body = body
        .trim_end()
        .strip_suffix(']')
        .ok_or_else(|| Error::protocol_parse(line.len(), "result row must end with ']'"))?;
    let body = body.trim_matches(' ');

    let mut row = Vec::new();
    let mut rest = body;
    loop {
        rest = rest.trim_start_matches(['\t', ' ']);
        if rest.is_empty() {
            break;
        }
        if rest.as_bytes().first() == Some(&b'"') {
            let (decoded, consumed) = parse_quoted(rest)?;
            row.push(Some(decoded.into_owned()));
            rest = &rest[consumed..];
            rest = rest.trim_start_matches(',');
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let (token, remainder) = rest.split_at(end);
            let token = token.trim();
            row.push(if token == "NULL" {
                None
            } else {
                Some(token.to_string())
            });
            rest = remainder.trim_start_matches(',');
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_row() {
        let row = parse_row(r#"[ 1,	"hello",	NULL	]"#).unwrap();
        assert_eq!(row, vec![Some("1".into()), Some("hello".into()), None]);
    }

    #[test]
    fn parses_single_value_row() {
        let row = parse_row("[ 42 ]").unwrap();
        assert_eq!(row, vec![Some("42".into())]);
    }

    #[test]
    fn quoted_value_may_contain_comma() {
        let row = parse_row(r#"[ "a, b",	2	]"#).unwrap();
        assert_eq!(row, vec![Some("a, b".into()), Some("2".into())]);
    }

    #[test]
    fn missing_brackets_error() {
        assert!(parse_row("1, 2").is_err());
    }
}
