//! File-transfer sub-protocol: the server asks the client to
//! read from or write to a local file, in text or binary mode.

use std::io::Write;

use crate::error::{Error, Result};

/// The four command shapes a file-transfer request line can carry
///. Per an Open Question decision recorded in
/// DESIGN.md, a path containing spaces is taken as the remainder of the
/// line after the second space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCommand {
    /// `r <offset> <path>`: upload text file starting at line `offset`
    /// (1-based; 0 and 1 both mean "from start").
    UploadText { offset: u64, path: String },
    /// `rb <path>`: upload binary file.
    UploadBinary { path: String },
    /// `w <path>`: download text file.
    DownloadText { path: String },
    /// `wb <path>`: download binary file.
    DownloadBinary { path: String },
}

/// Fixed reply the driver sends when no handler is registered for the
/// requested direction.
pub const NO_UPLOAD_HANDLER: &str =
    "No file upload handler has been registered with the JDBC driver\n";
pub const NO_DOWNLOAD_HANDLER: &str =
    "No file download handler has been registered with the JDBC driver\n";

/// Parses the command line that follows a `*` file-transfer request line.
pub fn parse_transfer_command(line: &str) -> Result<TransferCommand> {
    if let Some(rest) = line.strip_prefix("rb ") {
        return Ok(TransferCommand::UploadBinary {
            path: rest.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("wb ") {
        return Ok(TransferCommand::DownloadBinary {
            path: rest.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("r ") {
        let (offset_tok, path) = rest
            .split_once(' ')
            .ok_or_else(|| Error::protocol_parse(0, "upload command missing path"))?;
        let offset = offset_tok
            .parse::<u64>()
            .map_err(|_| Error::protocol_parse(0, format!("invalid upload offset '{offset_tok}'")))?;
        return Ok(TransferCommand::UploadText {
            offset,
            path: path.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("w ") {
        return Ok(TransferCommand::DownloadText {
            path: rest.to_string(),
        });
    }
    Err(Error::protocol_parse(
        0,
        format!("unrecognized file-transfer command '{line}'"),
    ))
}

/// Sink the driver hands an upload handler: writes the local file's bytes
/// toward the server.
pub struct UploadStream<'a> {
    writer: &'a mut dyn Write,
    chunk_size: usize,
    error_sent: bool,
    cancelled: bool,
    wrote_leading_newline: bool,
    on_cancel: Option<&'a mut dyn FnMut()>,
}

impl<'a> UploadStream<'a> {
    pub fn new(writer: &'a mut dyn Write, on_cancel: Option<&'a mut dyn FnMut()>) -> Self {
        Self {
            writer,
            chunk_size: 8192,
            error_sent: false,
            cancelled: false,
            wrote_leading_newline: false,
            on_cancel,
        }
    }

    /// The server may cancel mid-upload between chunks of this size
    ///.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Single-shot: any later call is a programming error.
    pub fn send_error(&mut self, message: &str) -> Result<()> {
        if self.error_sent {
            return Err(Error::api_misuse(
                "send_error called more than once on an upload stream",
            ));
        }
        self.error_sent = true;
        writeln!(self.writer, "{message}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one chunk of upload data. The protocol framing prepends a
    /// leading newline before the first user byte.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if self.cancelled {
            return Ok(());
        }
        if !self.wrote_leading_newline {
            self.writer.write_all(b"\n")?;
            self.wrote_leading_newline = true;
        }
        for chunk in data.chunks(self.chunk_size) {
            self.writer.write_all(chunk)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Marks the stream cancelled and invokes the registered
    /// upload-cancelled callback, if any.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(cb) = self.on_cancel.as_mut() {
            cb();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Closes the stream, sending the protocol terminator.
    pub fn finish(mut self) -> Result<()> {
        if !self.wrote_leading_newline {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Source the driver hands a download handler: reads bytes from the
/// server's reply stream.
pub struct DownloadStream<'a> {
    lines: std::slice::Iter<'a, String>,
    text_mode: bool,
}

impl<'a> DownloadStream<'a> {
    pub fn new(lines: &'a [String], text_mode: bool) -> Self {
        Self {
            lines: lines.iter(),
            text_mode,
        }
    }

    /// Reads the next line of the download. Text downloads are
    /// post-processed to prepend `\r` per line for platform line endings
    ///.
    pub fn read_line(&mut self) -> Option<String> {
        let line = self.lines.next()?;
        if self.text_mode {
            Some(format!("\r{line}"))
        } else {
            Some(line.clone())
        }
    }
}

/// Collapses `\r\n` to `\n` and validates UTF-8, as mandated for text-mode
/// uploads.
pub fn prepare_text_upload_chunk(raw: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::data_conversion("M1M05", "upload chunk is not valid UTF-8"))?;
    Ok(text.replace("\r\n", "\n"))
}

/// Invoked when the server initiates an upload and the caller registered a
/// handler. Implemented as a trait rather than a bare closure so handlers
/// can carry state across calls (mirrors the sub-crate handler traits the
/// teacher defines for result-set consumption).
pub trait UploadHandler: Send {
    fn handle(&mut self, path: &str, binary: bool, stream: &mut UploadStream<'_>) -> Result<()>;
}

/// Invoked when the server initiates a download.
pub trait DownloadHandler: Send {
    fn handle(&mut self, path: &str, binary: bool, stream: &mut DownloadStream<'_>) -> Result<()>;
}

impl<F> UploadHandler for F
where
    F: FnMut(&str, bool, &mut UploadStream<'_>) -> Result<()> + Send,
{
    fn handle(&mut self, path: &str, binary: bool, stream: &mut UploadStream<'_>) -> Result<()> {
        self(path, binary, stream)
    }
}

impl<F> DownloadHandler for F
where
    F: FnMut(&str, bool, &mut DownloadStream<'_>) -> Result<()> + Send,
{
    fn handle(&mut self, path: &str, binary: bool, stream: &mut DownloadStream<'_>) -> Result<()> {
        self(path, binary, stream)
    }
}
