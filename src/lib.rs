//! A core client driver for MonetDB's line-oriented MAPI wire protocol:
//! handshake and authentication, the statement/prepared-statement
//! execution pipeline, paged result-set caching, and literalization of
//! typed host values into SQL text.
//!
//! This crate deliberately stops at the narrow `Session` / `Statement` /
//! `PreparedStatement` / `ResultSet` surface documented in its design
//! notes: URL parsing of connection strings, TLS, connection pooling, and
//! the relational-API surface built on top are left to the embedding
//! application.

pub mod constant;
mod dispatcher;
pub mod error;
pub mod literal;
mod opts;
mod prepared;
pub mod protocol;
mod response;
mod resultset;
mod session;
mod statement;
mod transfer;
pub mod typemap;

pub use dispatcher::ResponseList;
pub use opts::Opts;
pub use prepared::{Descriptor, PreparedStatement};
pub use response::Response;
pub use resultset::{DataBlock, ResultSet};
pub use session::{Session, Warning};
pub use statement::Statement;
pub use transfer::{DownloadHandler, DownloadStream, UploadHandler, UploadStream};
