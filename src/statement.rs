//! Statement engine: single-statement and batch execution, driving a
//! `ResponseList` and exposing `next_result()` / `update_count()` /
//! `result_set()` accessors.

use std::sync::{Arc, Mutex, Weak};

use crate::constant::DEFAULT_REPLY_SIZE;
use crate::dispatcher::{self, ResponseList};
use crate::error::{ConnectionError, Error, Result};
use crate::protocol::Row;
use crate::response::Response;
use crate::resultset::ResultSet;
use crate::session::{Session, SessionBlockSource};

/// A live statement bound to a `Session`. Owns the weak-registry flag the
/// session flips on cascading close.
pub struct Statement {
    session: Session,
    closed: Arc<Mutex<bool>>,
    max_rows: i64,
    fetch_size: i64,
    responses: ResponseList,
    current: Option<Response>,
}

impl Statement {
    pub fn new(session: &Session) -> Self {
        let closed = Arc::new(Mutex::new(false));
        session.register_statement(Arc::downgrade(&closed) as Weak<Mutex<bool>>);
        Self {
            session: session.clone(),
            closed,
            max_rows: 0,
            fetch_size: 0,
            responses: ResponseList::empty(),
            current: None,
        }
    }

    /// Wraps an already-dispatched `ResponseList`, used by
    /// `PreparedStatement::execute` which drives its own wire turn and then
    /// behaves like a normal query.
    pub(crate) fn from_responses(session: &Session, responses: ResponseList) -> Self {
        let mut stmt = Self::new(session);
        stmt.responses = responses;
        stmt
    }

    /// Caps the number of rows a result set reports (0 = unlimited).
    pub fn set_max_rows(&mut self, max_rows: i64) {
        self.max_rows = max_rows;
    }

    /// Overrides the per-call fetch size (0 = session default, -1 = unlimited).
    pub fn set_fetch_size(&mut self, fetch_size: i64) {
        self.fetch_size = fetch_size;
    }

    fn check_open(&self) -> Result<()> {
        let closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return Err(Error::Connection(ConnectionError::Closed));
        }
        Ok(())
    }

    /// Executes one statement, or a `;`-joined multi-statement batch — MAPI
    /// itself interleaves the resulting result/update/schema/transaction
    /// responses into a single `ResponseList`.
    pub fn execute(&mut self, sql: &str) -> Result<bool> {
        self.check_open()?;
        let cache_size =
            dispatcher::effective_reply_size(self.fetch_size, self.max_rows, DEFAULT_REPLY_SIZE);
        self.responses = dispatcher::run_query_turn(&self.session, sql, cache_size)?;
        self.advance()
    }

    /// Joins `statements` with the session's language separator and submits
    /// them as a single turn.
    pub fn execute_batch(&mut self, statements: &[&str]) -> Result<bool> {
        let separator = self.session.language().templates().separator;
        self.execute(&statements.join(separator))
    }

    /// Advances to the next response in the batch. `true` iff it is a
    /// result set.
    pub fn next_result(&mut self) -> Result<bool> {
        self.check_open()?;
        self.advance()
    }

    fn advance(&mut self) -> Result<bool> {
        self.current = self.responses.next();
        Ok(matches!(self.current, Some(Response::ResultSet(_))))
    }

    /// `Some(affected_rows)` iff the current response is an update ack.
    pub fn update_count(&self) -> Option<i64> {
        match &self.current {
            Some(Response::Update { affected, .. }) => Some(*affected),
            _ => None,
        }
    }

    /// `Some(last_insert_id)` iff the current response is an update ack
    /// that produced one (`-1` otherwise).
    pub fn last_insert_id(&self) -> Option<i64> {
        match &self.current {
            Some(Response::Update { last_id, .. }) => Some(*last_id),
            _ => None,
        }
    }

    /// The current response's result set, if any.
    pub fn result_set(&mut self) -> Option<&mut ResultSet> {
        match &mut self.current {
            Some(Response::ResultSet(rs)) => Some(rs),
            _ => None,
        }
    }

    /// Reads row `r` of the current result set, fetching a block from the
    /// server on a cache miss.
    pub fn get_row(&mut self, r: i64) -> Result<Option<Row>> {
        self.check_open()?;
        let session = self.session.clone();
        match &mut self.current {
            Some(Response::ResultSet(rs)) => {
                let mut source = SessionBlockSource { session: &session };
                rs.get_row(r, &mut source)
            }
            _ => Ok(None),
        }
    }

    /// Releases the current result set's server-side state, if it has any
    ///.
    pub fn close(&mut self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return Ok(());
        }
        *closed = true;
        drop(closed);
        if let Some(Response::ResultSet(rs)) = &mut self.current {
            if rs.needs_server_close() {
                let id = rs.id;
                rs.close_locally();
                return self.session.close_result(id);
            }
            rs.close_locally();
        }
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
