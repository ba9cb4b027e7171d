use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// One server-reported error: a SQLSTATE plus message, as carried by a `!` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlError {
    pub sqlstate: String,
    pub message: String,
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.sqlstate, self.message)
    }
}

/// Reasons a connection is fatally unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("unreachable host: {0}")]
    Unreachable(String),
    #[error("connection timed out")]
    Timeout,
    #[error("unexpected end of stream")]
    Eof,
    #[error("connection is closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("protocol parse error at byte {offset}: {message}")]
    ProtocolParse { offset: usize, message: String },

    #[error("{0}")]
    Sql(SqlError),

    #[error("{first}{}", rest.iter().map(|e| format!("; {e}")).collect::<String>())]
    SqlChain { first: SqlError, rest: Vec<SqlError> },

    #[error("data conversion error ({sqlstate}): {message}")]
    DataConversion {
        sqlstate: &'static str,
        message: String,
    },

    #[error("API misuse: {0}")]
    ApiMisuse(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Error::Connection(ConnectionError::Timeout)
            }
            std::io::ErrorKind::UnexpectedEof => Error::Connection(ConnectionError::Eof),
            _ => Error::Connection(ConnectionError::Io(e.to_string())),
        }
    }
}

impl Error {
    /// Driver-generated SQLSTATE class for a generic local error (`M0M`-family).
    pub const LOCAL_GENERIC: &'static str = "M0M27";
    /// Driver-generated SQLSTATE class for an unsupported-feature local error (`M1M`-family).
    pub const LOCAL_UNSUPPORTED: &'static str = "M1M05";

    /// True if this error means the session must transition to closed.
    pub fn is_conn_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Auth(_))
    }

    pub fn protocol_parse(offset: usize, message: impl Into<String>) -> Self {
        Error::ProtocolParse {
            offset,
            message: message.into(),
        }
    }

    pub fn data_conversion(sqlstate: &'static str, message: impl Into<String>) -> Self {
        Error::DataConversion {
            sqlstate,
            message: message.into(),
        }
    }

    pub fn api_misuse(message: impl Into<String>) -> Self {
        Error::ApiMisuse(message.into())
    }

    /// Parse a `!`-line error payload: 5-char SQLSTATE, then `!`, then message,
    /// per spec: "SQLSTATE parsed from chars 0..4 and message from char 6..".
    pub fn parse_sql_error(line: &str) -> SqlError {
        let body = line.strip_prefix('!').unwrap_or(line);
        if body.len() >= 6 && body.as_bytes()[5] == b'!' {
            SqlError {
                sqlstate: body[0..5].to_string(),
                message: body[6..].to_string(),
            }
        } else {
            SqlError {
                sqlstate: Self::LOCAL_GENERIC.to_string(),
                message: body.to_string(),
            }
        }
    }

    /// Build the chained error the dispatcher raises after a turn that accumulated
    /// one or more server errors: first keeps its own SQLSTATE, the rest become
    /// connection-class chain links.
    pub fn from_sql_lines(lines: &[&str]) -> Self {
        let mut errors = lines.iter().map(|l| Self::parse_sql_error(l));
        let first = errors.next().unwrap_or(SqlError {
            sqlstate: Self::LOCAL_GENERIC.to_string(),
            message: "unknown server error".to_string(),
        });
        let rest: Vec<SqlError> = errors.collect();
        if rest.is_empty() {
            Error::Sql(first)
        } else {
            Error::SqlChain { first, rest }
        }
    }
}
