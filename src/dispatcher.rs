//! Response dispatcher: turns a session's raw reply lines into a
//! `ResponseList`.

use crate::error::{Error, Result};
use crate::protocol::header::{apply_header_line, parse_header_line, ColumnMeta};
use crate::protocol::row::parse_row;
use crate::protocol::soh::{as_prepare, parse_start_of_header, StartOfHeader};
use crate::protocol::LineType;
use crate::resultset::{DataBlock, ResultSet};
use crate::response::Response;
use crate::session::Session;

/// An ordered, drain-once sequence of the responses a single turn produced.
pub struct ResponseList {
    responses: std::collections::VecDeque<Response>,
}

impl ResponseList {
    pub fn empty() -> Self {
        Self {
            responses: std::collections::VecDeque::new(),
        }
    }

    pub(crate) fn from_vec(responses: Vec<Response>) -> Self {
        Self {
            responses: responses.into(),
        }
    }

    pub fn next(&mut self) -> Option<Response> {
        self.responses.pop_front()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Computes the effective reply size for a call:
/// `max(cache-size, min(max-rows, default-fetch-size))`, with `0` meaning
/// "use the default" and `-1` meaning "unlimited" on both inputs.
pub fn effective_reply_size(cache_size: i64, max_rows: i64, default_fetch_size: i64) -> i64 {
    let capped_by_max_rows = match max_rows {
        -1 | 0 => default_fetch_size,
        n => n.min(default_fetch_size),
    };
    match cache_size {
        -1 => -1,
        0 => capped_by_max_rows,
        n => n.max(capped_by_max_rows),
    }
}

/// Runs one full query turn and dispatches its lines into a `ResponseList`
///: negotiates reply size if the effective size for this call
/// differs from the session's current one, sends the text, then classifies
/// every line up to the prompt. Draining a stale remainder from an aborted
/// previous turn is handled by `Session::turn` itself, which always reads
/// to the next prompt before returning.
pub fn run_query_turn(session: &Session, text: &str, cache_size: i64) -> Result<ResponseList> {
    if session.reply_size() != cache_size {
        session.set_reply_size(cache_size)?;
    }
    let (lines, sequence) = session.turn(text, false)?;
    let effective_cache_size = if cache_size > 0 {
        cache_size
    } else {
        session.default_cache_size()
    };
    dispatch_lines(&lines, sequence, effective_cache_size)
}

fn dispatch_lines(lines: &[String], sequence: u64, cache_size: i64) -> Result<ResponseList> {
    let mut responses = std::collections::VecDeque::new();
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i].as_str();
        match LineType::classify(line) {
            LineType::StartOfHeader => {
                let soh = parse_start_of_header(line)?;
                i += 1;
                match soh {
                    StartOfHeader::QTable {
                        id,
                        tuples,
                        columns: column_count,
                        rowcount,
                    } => {
                        let mut columns: Vec<ColumnMeta> = Vec::new();
                        while i < lines.len()
                            && matches!(LineType::classify(&lines[i]), LineType::Header)
                        {
                            let header = parse_header_line(&lines[i])?;
                            apply_header_line(&mut columns, header);
                            i += 1;
                        }
                        if columns.len() != column_count as usize {
                            columns.resize(column_count as usize, ColumnMeta::default());
                        }

                        let mut block = DataBlock::new(rowcount as usize, true);
                        for _ in 0..rowcount {
                            let row_line = lines.get(i).ok_or_else(|| {
                                Error::protocol_parse(0, "truncated result block")
                            })?;
                            block.add_row(parse_row(row_line)?);
                            i += 1;
                        }

                        let mut result_set = ResultSet::new(id, tuples, columns, cache_size, true, sequence);
                        result_set.install_first_block(block);
                        responses.push_back(Response::ResultSet(result_set));
                    }
                    StartOfHeader::QUpdate { affected, last_id } => {
                        responses.push_back(Response::Update { affected, last_id });
                    }
                    StartOfHeader::QSchema => {
                        responses.push_back(Response::Schema);
                    }
                    StartOfHeader::QTrans { autocommit } => {
                        responses.push_back(Response::AutoCommit(autocommit));
                    }
                    StartOfHeader::QParse | StartOfHeader::QPrepare { .. } => {
                        // Not produced at this call site; PREPARE replies are
                        // dispatched separately by `run_prepare_turn`.
                    }
                    StartOfHeader::QBlock { .. } => {
                        return Err(Error::protocol_parse(
                            0,
                            "unexpected block-continuation header in a query turn",
                        ));
                    }
                }
            }
            LineType::Header | LineType::ResultRow => {
                return Err(Error::protocol_parse(
                    0,
                    format!("unexpected line outside a start-of-header block: {line}"),
                ));
            }
            LineType::FileTransfer => {
                return Err(Error::protocol_parse(
                    0,
                    "file-transfer request must be handled by the transfer sub-protocol, not the dispatcher",
                ));
            }
            LineType::Error | LineType::Info | LineType::Prompt | LineType::Unexpected => {
                i += 1;
            }
        }
    }

    Ok(ResponseList { responses })
}

/// Dispatches the reply to a `PREPARE` statement: the `&1` header's rows
/// describe parameter/result columns rather than user data.
pub fn run_prepare_turn(session: &Session, text: &str) -> Result<(i64, Vec<ColumnMeta>, Vec<crate::protocol::Row>)> {
    let (lines, _sequence) = session.turn(text, false)?;
    let mut i = 0usize;

    while i < lines.len() {
        if matches!(LineType::classify(&lines[i]), LineType::StartOfHeader) {
            let Some(soh) = as_prepare(parse_start_of_header(&lines[i])?) else {
                return Err(Error::protocol_parse(
                    0,
                    "as_prepare produced no start-of-header",
                ));
            };
            i += 1;
            if let StartOfHeader::QPrepare {
                id,
                columns: column_count,
                rowcount,
                ..
            } = soh
            {
                let mut columns: Vec<ColumnMeta> = Vec::new();
                while i < lines.len() && matches!(LineType::classify(&lines[i]), LineType::Header) {
                    let header = parse_header_line(&lines[i])?;
                    apply_header_line(&mut columns, header);
                    i += 1;
                }
                if columns.len() != column_count as usize {
                    columns.resize(column_count as usize, ColumnMeta::default());
                }

                let mut rows = Vec::with_capacity(rowcount as usize);
                for _ in 0..rowcount {
                    let row_line = lines
                        .get(i)
                        .ok_or_else(|| Error::protocol_parse(0, "truncated prepare descriptor"))?;
                    rows.push(parse_row(row_line)?);
                    i += 1;
                }
                return Ok((id, columns, rows));
            }
        } else {
            i += 1;
        }
    }

    Err(Error::protocol_parse(
        0,
        "PREPARE reply did not contain a descriptor table",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_reply_size_uses_default_when_unspecified() {
        assert_eq!(effective_reply_size(0, 0, 250), 250);
    }

    #[test]
    fn effective_reply_size_respects_explicit_cache_size_over_default() {
        assert_eq!(effective_reply_size(500, 0, 250), 500);
    }

    #[test]
    fn effective_reply_size_caps_to_max_rows_when_smaller_than_default() {
        assert_eq!(effective_reply_size(0, 10, 250), 10);
    }

    #[test]
    fn effective_reply_size_unlimited_cache_size_wins() {
        assert_eq!(effective_reply_size(-1, 10, 250), -1);
    }

    #[test]
    fn dispatches_result_set_with_headers_and_rows() {
        let lines: Vec<String> = vec![
            "&1 7 2 2 2".to_string(),
            "% id,\tname\t# name".to_string(),
            "% int,\tvarchar\t# type".to_string(),
            "[ 1,\t\"alice\"\t]".to_string(),
            "[ 2,\t\"bob\"\t]".to_string(),
        ];
        let mut list = dispatch_lines(&lines, 1, 250).unwrap();
        match list.next().unwrap() {
            Response::ResultSet(rs) => {
                assert_eq!(rs.tuples, 2);
                assert_eq!(rs.columns.len(), 2);
                assert_eq!(rs.columns[0].name, "id");
                assert_eq!(rs.columns[1].sql_type_name, "varchar");
            }
            other => panic!("expected ResultSet, got {}", other.kind_name()),
        }
        assert!(list.is_empty());
    }

    #[test]
    fn dispatches_update_and_schema_and_autocommit() {
        let lines: Vec<String> = vec![
            "&2 5 42".to_string(),
            "&3".to_string(),
            "&4 t".to_string(),
        ];
        let mut list = dispatch_lines(&lines, 1, 250).unwrap();
        assert!(matches!(
            list.next(),
            Some(Response::Update { affected: 5, last_id: 42 })
        ));
        assert!(matches!(list.next(), Some(Response::Schema)));
        assert!(matches!(list.next(), Some(Response::AutoCommit(false))));
    }

    #[test]
    fn rejects_stray_row_outside_header_block() {
        let lines: Vec<String> = vec!["[ 1 ]".to_string()];
        assert!(dispatch_lines(&lines, 1, 250).is_err());
    }

    #[test]
    fn prepare_turn_extracts_descriptor_rows() {
        // run_prepare_turn drives Session::turn, which needs a live socket;
        // the descriptor-extraction core is exercised directly instead.
        let lines: Vec<String> = vec![
            "&1 1 6 1".to_string(),
            "% varchar\t# type".to_string(),
            "[ \"int\",\tNULL,\tNULL,\tNULL,\tNULL,\tNULL\t]".to_string(),
        ];
        let mut i = 0usize;
        let soh = as_prepare(parse_start_of_header(&lines[i]).unwrap()).unwrap();
        i += 1;
        let (id, rowcount) = match soh {
            StartOfHeader::QPrepare { id, rowcount, .. } => (id, rowcount),
            _ => unreachable!(),
        };
        let mut columns = Vec::new();
        while i < lines.len() && matches!(LineType::classify(&lines[i]), LineType::Header) {
            apply_header_line(&mut columns, parse_header_line(&lines[i]).unwrap());
            i += 1;
        }
        let mut rows = Vec::new();
        for _ in 0..rowcount {
            rows.push(parse_row(&lines[i]).unwrap());
            i += 1;
        }
        assert_eq!(id, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Some("int".to_string()));
    }
}
