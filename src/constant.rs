//! Fixed protocol vocabulary: language query templates, handshake option
//! names, digest algorithm ranking, and the SQL type-code table.

use bitflags::bitflags;

/// The query language a session was opened with. Each has its own request
/// template (prefix/suffix/separator) composed around outgoing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Sql,
    Mal,
}

impl Language {
    pub fn templates(self) -> QueryTemplates {
        match self {
            Language::Sql => QueryTemplates {
                prefix: "s",
                suffix: "\n;",
                separator: "\n",
            },
            Language::Mal => QueryTemplates {
                prefix: "",
                suffix: ";\n",
                separator: "\n",
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Sql => "sql",
            Language::Mal => "mal",
        }
    }
}

impl core::str::FromStr for Language {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(Language::Sql),
            "mal" => Ok(Language::Mal),
            other => Err(crate::error::Error::api_misuse(format!(
                "unknown language '{other}', expected 'sql' or 'mal'"
            ))),
        }
    }
}

/// Prefix/suffix/separator wrapped around any text the driver writes to the
/// query channel.
#[derive(Debug, Clone, Copy)]
pub struct QueryTemplates {
    pub prefix: &'static str,
    pub suffix: &'static str,
    pub separator: &'static str,
}

/// Control commands use a fixed template regardless of language: prefix `X`,
/// empty suffix.
pub const CONTROL_PREFIX: &str = "X";
pub const CONTROL_SUFFIX: &str = "";

/// Server-side default reply size before any `reply_size` control command is sent.
pub const DEFAULT_REPLY_SIZE: i64 = 250;

/// Sentinel meaning "use the server default" for a reply/fetch size.
pub const REPLY_SIZE_DEFAULT: i64 = 0;
/// Sentinel meaning "unlimited" for a reply/fetch size.
pub const REPLY_SIZE_UNLIMITED: i64 = -1;

/// Fetch size temporarily applied around a `PREPARE` call so its descriptor
/// result set always fits in the inline first block.
pub const PREPARE_FETCH_SIZE: i64 = 10_000;

/// Growth factor applied to the cache size on an adaptive-prefetch decision.
pub const ADAPTIVE_GROWTH_FACTOR: usize = 10;
/// Cache size is never grown adaptively past this multiple of the default fetch size.
pub const ADAPTIVE_GROWTH_CAP_FACTOR: usize = 10;

bitflags! {
    /// Handshake options the client may negotiate in the login block.
    /// Bits accepted by the server at handshake time do not need a post-handshake
    /// follow-up control command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandshakeOptions: u8 {
        const AUTOCOMMIT  = 0b0000_0001;
        const REPLY_SIZE  = 0b0000_0010;
        const SIZE_HEADER = 0b0000_0100;
        const TIME_ZONE   = 0b0000_1000;
    }
}

/// Digest algorithms the client knows how to compute, ranked strongest-first.
/// Handshake negotiation picks the first of these also advertised by the server.
pub const SUPPORTED_DIGEST_ALGORITHMS: &[&str] = &["SHA512", "SHA384", "SHA256", "SHA1", "MD5"];

/// SQL type codes the type mapper produces for server-declared column types.
/// Mirrors the JDBC `java.sql.Types` universe closely enough to be a faithful
/// target without depending on any particular host API crate.
#[allow(non_camel_case_types)]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    CHAR = 1,
    VARCHAR = 12,
    CLOB = 2005,
    BOOLEAN = 16,
    TINYINT = -6,
    SMALLINT = 5,
    INTEGER = 4,
    BIGINT = -5,
    REAL = 7,
    FLOAT = 6,
    DOUBLE = 8,
    DECIMAL = 3,
    NUMERIC = 2,
    DATE = 91,
    TIME = 92,
    TIME_WITH_TIMEZONE = 2013,
    TIMESTAMP = 93,
    TIMESTAMP_WITH_TIMEZONE = 2014,
    BLOB = 2004,
    BINARY = -2,
    OTHER = 1111,
    NULL = 0,
}

/// SQLSTATE used by the literalizer for an invalid domain-type literal
/// (inet/url/uuid/json cast failure), per spec §8 scenario 4.
pub const SQLSTATE_INVALID_DOMAIN_VALUE: &str = "22M29";

#[cfg(test)]
#[path = "constant_test.rs"]
mod constant_test;
