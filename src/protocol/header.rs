//! Parses `%` header lines into the per-column metadata rows MonetDB emits
//! as a sequence of labeled field vectors: one `%` line per
//! metadata kind (`name`, `length`, `type`, `table_name`), each carrying one
//! value per column, comma-separated, terminated by `\t#<keyword>`.

use crate::error::{Error, Result};
use crate::protocol::quoted::parse_quoted;

/// One parsed `%` line: the metadata kind it carries, and one value per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub keyword: String,
    pub values: Vec<String>,
}

/// Per-column metadata assembled from a result's `%` header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub table: String,
    pub schema: String,
    pub sql_type_name: String,
    pub length: i64,
    pub scale: i64,
}

pub fn parse_header_line(line: &str) -> Result<HeaderLine> {
    let body = line
        .strip_prefix('%')
        .ok_or_else(|| Error::protocol_parse(0, "header line must begin with '%'"))?;
    let body = body.strip_prefix(' ').unwrap_or(body);

    let split_at = body
        .rfind("\t#")
        .ok_or_else(|| Error::protocol_parse(body.len(), "header line missing '\\t#keyword'"))?;
    let (fields_part, keyword_part) = body.split_at(split_at);
    let keyword = keyword_part.trim_start_matches("\t#").trim().to_string();

    let values = split_fields(fields_part)?;

    Ok(HeaderLine { keyword, values })
}

fn split_fields(fields_part: &str) -> Result<Vec<String>> {
    let mut values = Vec::new();
    let mut rest = fields_part;
    loop {
        rest = rest.trim_start_matches(['\t']);
        if rest.is_empty() {
            break;
        }
        if rest.as_bytes().first() == Some(&b'"') {
            let (decoded, consumed) = parse_quoted(rest)?;
            values.push(decoded.into_owned());
            rest = &rest[consumed..];
            rest = rest.trim_start_matches(',');
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let (token, remainder) = rest.split_at(end);
            values.push(token.trim().to_string());
            rest = remainder.trim_start_matches(',');
        }
    }
    Ok(values)
}

/// Folds a sequence of `HeaderLine`s (in arrival order) into per-column
/// metadata, growing `columns` on first sight of each keyword.
pub fn apply_header_line(columns: &mut Vec<ColumnMeta>, header: HeaderLine) {
    if columns.len() < header.values.len() {
        columns.resize(header.values.len(), ColumnMeta::default());
    }
    for (col, value) in columns.iter_mut().zip(header.values.into_iter()) {
        match header.keyword.as_str() {
            "name" => col.name = value,
            "table_name" => {
                if let Some((schema, table)) = value.split_once('.') {
                    col.schema = schema.to_string();
                    col.table = table.to_string();
                } else {
                    col.table = value;
                }
            }
            "type" => col.sql_type_name = value,
            "length" => col.length = value.parse().unwrap_or(0),
            "scale" => col.scale = value.parse().unwrap_or(0),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_header() {
        let h = parse_header_line("% c1,\tc2,\tc3\t# name").unwrap();
        assert_eq!(h.keyword, "name");
        assert_eq!(h.values, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn parses_table_name_header_with_schema() {
        let mut cols = Vec::new();
        let h = parse_header_line("% sys.tables,\tsys.tables\t# table_name").unwrap();
        apply_header_line(&mut cols, h);
        assert_eq!(cols[0].schema, "sys");
        assert_eq!(cols[0].table, "tables");
    }

    #[test]
    fn assembles_multiple_lines_into_column_meta() {
        let mut cols = Vec::new();
        apply_header_line(&mut cols, parse_header_line("% id,\tname\t# name").unwrap());
        apply_header_line(
            &mut cols,
            parse_header_line("% int,\tvarchar\t# type").unwrap(),
        );
        apply_header_line(&mut cols, parse_header_line("% 32,\t100\t# length").unwrap());

        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].name, "id");
        assert_eq!(cols[0].sql_type_name, "int");
        assert_eq!(cols[0].length, 32);
        assert_eq!(cols[1].name, "name");
        assert_eq!(cols[1].sql_type_name, "varchar");
        assert_eq!(cols[1].length, 100);
    }

    #[test]
    fn handles_quoted_values() {
        let h = parse_header_line("% \"hello, world\",\tplain\t# name").unwrap();
        assert_eq!(h.values, vec!["hello, world", "plain"]);
    }

    #[test]
    fn missing_keyword_marker_errors() {
        assert!(parse_header_line("% a,b,c").is_err());
    }
}
