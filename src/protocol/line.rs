//! Framed line reader and first-byte classifier.

use std::io::BufRead;

use crate::error::{ConnectionError, Error, Result};

/// The line types the server's first byte classifies a line into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    /// `^` — end of the server's response for the current turn.
    Prompt,
    /// `&` — declares a new Response, drives dispatch.
    StartOfHeader,
    /// `%` — column-metadata continuation of the current Response.
    Header,
    /// `[` — a data row.
    ResultRow,
    /// `!` — server error.
    Error,
    /// `#` — advisory / warning line.
    Info,
    /// `*` — server asks the client to read or write a local file.
    FileTransfer,
    /// Anything else: a protocol violation.
    Unexpected,
}

impl LineType {
    pub fn classify(line: &str) -> Self {
        match line.as_bytes().first() {
            Some(b'^') => LineType::Prompt,
            Some(b'&') => LineType::StartOfHeader,
            Some(b'%') => LineType::Header,
            Some(b'[') => LineType::ResultRow,
            Some(b'!') => LineType::Error,
            Some(b'#') => LineType::Info,
            Some(b'*') => LineType::FileTransfer,
            _ => LineType::Unexpected,
        }
    }
}

/// Reads MAPI lines off a buffered byte stream, exposing the three
/// primitives spec §4.1 names: current line/type, advance, and
/// discard-remainder.
pub struct LineReader<R> {
    inner: R,
    current: String,
    debug: bool,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            current: String::new(),
            debug: false,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn line_type(&self) -> LineType {
        LineType::classify(&self.current)
    }

    /// Blocks until the next line arrives, or returns a transient-I/O /
    /// connection-timeout error that must close the session.
    pub fn advance(&mut self) -> Result<()> {
        self.current.clear();
        let n = self.inner.read_line(&mut self.current).map_err(Error::from)?;
        if n == 0 {
            return Err(Error::Connection(ConnectionError::Eof));
        }
        while self.current.ends_with(['\n', '\r']) {
            self.current.pop();
        }
        if self.debug {
            log::trace!("mapi <- {}", truncate_for_log(&self.current));
        }
        Ok(())
    }

    /// Reads and discards lines until the next prompt. Returns the first
    /// error line seen while discarding, if any, so an aborted previous
    /// turn's error surfaces on the next call.
    pub fn discard_remainder(&mut self) -> Result<Option<String>> {
        let mut first_error = None;
        loop {
            self.advance()?;
            match self.line_type() {
                LineType::Prompt => return Ok(first_error),
                LineType::Error if first_error.is_none() => {
                    first_error = Some(self.current.clone());
                }
                _ => {}
            }
        }
    }
}

fn truncate_for_log(line: &str) -> &str {
    let max = 200;
    if line.len() <= max {
        line
    } else {
        &line[..max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_first_byte() {
        assert_eq!(LineType::classify("^mapi:monetdb"), LineType::Prompt);
        assert_eq!(LineType::classify("&1 0 2 1 2"), LineType::StartOfHeader);
        assert_eq!(LineType::classify("% name,\tother # name"), LineType::Header);
        assert_eq!(LineType::classify("[ 1\t]"), LineType::ResultRow);
        assert_eq!(LineType::classify("!42000!syntax error"), LineType::Error);
        assert_eq!(LineType::classify("#info"), LineType::Info);
        assert_eq!(LineType::classify("*r 0 /tmp/x"), LineType::FileTransfer);
        assert_eq!(LineType::classify("garbage"), LineType::Unexpected);
        assert_eq!(LineType::classify(""), LineType::Unexpected);
    }

    #[test]
    fn advance_reads_and_strips_newline() {
        let data = b"&1 0 2 1 2\n^\n".to_vec();
        let mut reader = LineReader::new(std::io::Cursor::new(data));
        reader.advance().unwrap();
        assert_eq!(reader.current(), "&1 0 2 1 2");
        assert_eq!(reader.line_type(), LineType::StartOfHeader);
        reader.advance().unwrap();
        assert_eq!(reader.current(), "^");
        assert_eq!(reader.line_type(), LineType::Prompt);
    }

    #[test]
    fn advance_on_eof_is_connection_error() {
        let mut reader = LineReader::new(std::io::Cursor::new(Vec::new()));
        let err = reader.advance().unwrap_err();
        assert!(err.is_conn_fatal());
    }

    #[test]
    fn discard_remainder_stops_at_prompt_and_surfaces_first_error() {
        let data = b"#warn one\n!42000!boom\n#warn two\n^\n".to_vec();
        let mut reader = LineReader::new(std::io::Cursor::new(data));
        let first_error = reader.discard_remainder().unwrap();
        assert_eq!(first_error.as_deref(), Some("!42000!boom"));
    }
}
