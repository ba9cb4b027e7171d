//! The `Response` tagged union a single server turn produces.

use crate::resultset::ResultSet;

/// One parsed server response within a turn's `ResponseList`. A single
/// batch can interleave any number of these before the closing prompt.
///
/// The `&1` reply to a `PREPARE` call (tuples describing parameter and
/// result-column descriptors rather than user data) is never represented
/// here: it is consumed once by `Session::prepare`/`dispatcher::run_prepare_turn`
/// on its own dedicated path and never reaches a user-visible `ResponseList`.
pub enum Response {
    /// `&1` header: a tabular result.
    ResultSet(ResultSet),
    /// `&2` header: rows affected plus last-generated id (`-1` if none).
    Update { affected: i64, last_id: i64 },
    /// `&3` header: a DDL statement acknowledgement, no payload.
    Schema,
    /// `&4` header: the session's transaction/autocommit state flipped.
    AutoCommit(bool),
}

impl Response {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Response::ResultSet(_) => "result_set",
            Response::Update { .. } => "update",
            Response::Schema => "schema",
            Response::AutoCommit(_) => "autocommit",
        }
    }
}
