//! Start-of-header grammar: `&T v1 v2 v3 v4 …`.

use crate::error::{Error, Result};

/// A parsed `&` line, tagged by its first field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOfHeader {
    /// Prepare-result form, never appears at the top level of a user query
    /// in this role.
    QParse,
    /// Tabular result: id, tuple count, column count, rowcount of this block.
    QTable {
        id: i64,
        tuples: i64,
        columns: i64,
        rowcount: i64,
    },
    /// Special form of `QTable` whose rows describe a prepared statement.
    QPrepare {
        id: i64,
        tuples: i64,
        columns: i64,
        rowcount: i64,
    },
    /// Affected-row count + last-insert id.
    QUpdate { affected: i64, last_id: i64 },
    /// DDL ack, no fields.
    QSchema,
    /// Transaction state toggle, `t` (in transaction) or `f` (autocommit).
    QTrans { autocommit: bool },
    /// Continuation block for an existing result set.
    QBlock {
        id: i64,
        columns: i64,
        rowcount: i64,
        offset: i64,
    },
}

/// Parses a `&`-prefixed line. The leading `&` must already be present.
pub fn parse_start_of_header(line: &str) -> Result<StartOfHeader> {
    let rest = line
        .strip_prefix('&')
        .ok_or_else(|| Error::protocol_parse(0, "start-of-header line must begin with '&'"))?;
    let mut fields = rest.split_whitespace();

    let tag = fields
        .next()
        .ok_or_else(|| Error::protocol_parse(1, "missing start-of-header tag"))?;

    match tag {
        "1" => {
            let (id, tuples, columns, rowcount) = four_ints(&mut fields, line)?;
            Ok(StartOfHeader::QTable {
                id,
                tuples,
                columns,
                rowcount,
            })
        }
        "2" => {
            let (affected, last_id) = two_ints(&mut fields, line)?;
            Ok(StartOfHeader::QUpdate { affected, last_id })
        }
        "3" => Ok(StartOfHeader::QSchema),
        "4" => {
            let tok = fields
                .next()
                .ok_or_else(|| Error::protocol_parse(1, "missing transaction flag"))?;
            let autocommit = match tok {
                "t" => false,
                "f" => true,
                other => {
                    return Err(Error::protocol_parse(
                        1,
                        format!("invalid transaction flag '{other}'"),
                    ));
                }
            };
            Ok(StartOfHeader::QTrans { autocommit })
        }
        "5" => Ok(StartOfHeader::QParse),
        "6" => {
            let (id, columns, rowcount, offset) = four_ints(&mut fields, line)?;
            Ok(StartOfHeader::QBlock {
                id,
                columns,
                rowcount,
                offset,
            })
        }
        other => Err(Error::protocol_parse(
            1,
            format!("unknown start-of-header tag '{other}'"),
        )),
    }
}

/// `QPrepare` is produced by the dispatcher when a `&1` header is the
/// response to a `PREPARE` call; the wire form is identical to `QTable`.
pub fn as_prepare(soh: StartOfHeader) -> Option<StartOfHeader> {
    match soh {
        StartOfHeader::QTable {
            id,
            tuples,
            columns,
            rowcount,
        } => Some(StartOfHeader::QPrepare {
            id,
            tuples,
            columns,
            rowcount,
        }),
        other => Some(other),
    }
}

fn next_int<'a>(fields: &mut impl Iterator<Item = &'a str>, line: &str) -> Result<i64> {
    let tok = fields
        .next()
        .ok_or_else(|| Error::protocol_parse(line.len(), "missing start-of-header field"))?;
    tok.parse::<i64>()
        .map_err(|_| Error::protocol_parse(0, format!("invalid integer field '{tok}'")))
}

fn two_ints<'a>(fields: &mut impl Iterator<Item = &'a str>, line: &str) -> Result<(i64, i64)> {
    Ok((next_int(fields, line)?, next_int(fields, line)?))
}

fn four_ints<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    line: &str,
) -> Result<(i64, i64, i64, i64)> {
    Ok((
        next_int(fields, line)?,
        next_int(fields, line)?,
        next_int(fields, line)?,
        next_int(fields, line)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_header() {
        let soh = parse_start_of_header("&1 7 10000 3 250").unwrap();
        assert_eq!(
            soh,
            StartOfHeader::QTable {
                id: 7,
                tuples: 10000,
                columns: 3,
                rowcount: 250
            }
        );
    }

    #[test]
    fn parses_update_header() {
        let soh = parse_start_of_header("&2 1 42").unwrap();
        assert_eq!(
            soh,
            StartOfHeader::QUpdate {
                affected: 1,
                last_id: 42
            }
        );
    }

    #[test]
    fn parses_schema_header() {
        assert_eq!(parse_start_of_header("&3").unwrap(), StartOfHeader::QSchema);
    }

    #[test]
    fn parses_transaction_header() {
        assert_eq!(
            parse_start_of_header("&4 t").unwrap(),
            StartOfHeader::QTrans { autocommit: false }
        );
        assert_eq!(
            parse_start_of_header("&4 f").unwrap(),
            StartOfHeader::QTrans { autocommit: true }
        );
    }

    #[test]
    fn parses_block_header() {
        let soh = parse_start_of_header("&6 7 3 2500 250").unwrap();
        assert_eq!(
            soh,
            StartOfHeader::QBlock {
                id: 7,
                columns: 3,
                rowcount: 2500,
                offset: 250
            }
        );
    }

    #[test]
    fn invalid_tag_is_protocol_error() {
        let err = parse_start_of_header("&9 1 2").unwrap_err();
        assert!(matches!(err, Error::ProtocolParse { .. }));
    }

    #[test]
    fn missing_ampersand_is_protocol_error() {
        assert!(parse_start_of_header("1 2 3").is_err());
    }

    #[test]
    fn prepare_reuses_table_wire_form() {
        let soh = as_prepare(StartOfHeader::QTable {
            id: 1,
            tuples: 2,
            columns: 3,
            rowcount: 2,
        })
        .unwrap();
        assert!(matches!(soh, StartOfHeader::QPrepare { .. }));
    }
}
