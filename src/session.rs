//! Session: the owned connection, its wire state, and the single mutex that
//! serializes every request against it.

use std::io::{BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::constant::{HandshakeOptions, Language};
use crate::error::{ConnectionError, Error, Result};
use crate::opts::Opts;
use crate::protocol::handshake::{
    self, Challenge, HandshakeResponse, WantedOptions,
};
use crate::protocol::soh::{parse_start_of_header, StartOfHeader};
use crate::protocol::writer::Writer;
use crate::protocol::{LineReader, LineType, Row};
use crate::resultset::BlockSource;
use crate::transfer::{
    self, DownloadHandler, DownloadStream, TransferCommand, UploadHandler, UploadStream,
    NO_DOWNLOAD_HANDLER, NO_UPLOAD_HANDLER,
};

/// An advisory `#` line raised outside of a result set's own header block,
/// kept until the caller reads or explicitly clears it.
#[derive(Debug, Clone)]
pub struct Warning {
    pub text: String,
    pub sequence: u64,
}

struct SessionInner {
    stream: TcpStream,
    writer: Writer<TcpStream>,
    reader: LineReader<BufReader<TcpStream>>,
    opts: Opts,
    language: Language,
    autocommit: bool,
    reply_size: i64,
    accepted: HandshakeOptions,
    warnings: Vec<Warning>,
    sequence: u64,
    closed: Arc<AtomicBool>,
    statements: Vec<Weak<Mutex<bool>>>,
    upload_handler: Option<Box<dyn UploadHandler>>,
    download_handler: Option<Box<dyn DownloadHandler>>,
}

/// A shared, cloneable handle to a MAPI connection. Every operation that
/// touches the wire takes the inner mutex first: MAPI allows exactly one
/// outstanding request per connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    /// Locks the session state. A poisoned lock (a prior holder panicked
    /// mid-request) still holds a structurally valid `SessionInner`, so we
    /// recover it rather than propagate the poisoning to every caller.
    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a TCP connection to `opts.host:opts.port` and runs the
    /// handshake, following redirects up to [`handshake::MAX_REDIRECTS`]
    /// times.
    pub fn connect(mut opts: Opts) -> Result<Session> {
        let mut redirects = 0u32;
        loop {
            let stream = TcpStream::connect((opts.host.as_str(), opts.port))
                .map_err(|e| Error::Connection(ConnectionError::Unreachable(e.to_string())))?;
            if opts.so_timeout > 0 {
                let dur = Duration::from_millis(opts.so_timeout);
                stream.set_read_timeout(Some(dur))?;
                stream.set_write_timeout(Some(dur))?;
            }
            let write_half = stream.try_clone()?;
            let mut reader = LineReader::new(BufReader::new(stream.try_clone()?));
            reader.set_debug(opts.debug);

            match run_handshake(&mut reader, write_half, &opts)? {
                HandshakeOutcome::Ready {
                    language,
                    accepted,
                } => {
                    let writer = Writer::new(stream.try_clone()?, language);
                    let inner = SessionInner {
                        stream,
                        writer,
                        reader,
                        language,
                        autocommit: opts.autocommit,
                        reply_size: 0,
                        accepted,
                        warnings: Vec::new(),
                        sequence: 0,
                        closed: Arc::new(AtomicBool::new(false)),
                        statements: Vec::new(),
                        upload_handler: None,
                        download_handler: None,
                        opts: opts.clone(),
                    };
                    let session = Session {
                        inner: Arc::new(Mutex::new(inner)),
                    };
                    session.apply_wanted_followups(&opts)?;
                    return Ok(session);
                }
                HandshakeOutcome::Redirect(target) => {
                    redirects += 1;
                    if redirects > handshake::MAX_REDIRECTS {
                        return Err(Error::Connection(ConnectionError::Unreachable(format!(
                            "too many redirects, last target '{target}'"
                        ))));
                    }
                    let (host, rest) = target
                        .split_once(':')
                        .ok_or_else(|| Error::protocol_parse(0, "malformed redirect target"))?;
                    let (port, db) = rest.split_once('/').unwrap_or((rest, ""));
                    opts.host = host.to_string();
                    opts.port = port
                        .parse()
                        .map_err(|_| Error::protocol_parse(0, "invalid redirect port"))?;
                    if !db.is_empty() {
                        opts.database = db.to_string();
                    }
                }
            }
        }
    }

    /// Any control commands the server didn't accept inline at handshake
    /// must be sent explicitly as a follow-up turn.
    fn apply_wanted_followups(&self, opts: &Opts) -> Result<()> {
        let wanted = WantedOptions::from_opts(opts);
        let mut guard = self.lock();
        if let Some(autocommit) = wanted.autocommit {
            if !guard.accepted.contains(HandshakeOptions::AUTOCOMMIT) {
                send_control(&mut guard, &format!("auto_commit {}", autocommit as u8))?;
                guard.autocommit = autocommit;
            }
        }
        if let Some(size) = wanted.reply_size {
            if !guard.accepted.contains(HandshakeOptions::REPLY_SIZE) {
                send_control(&mut guard, &format!("reply_size {size}"))?;
                guard.reply_size = size;
            }
        }
        Ok(())
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    /// A snapshot of the connection options this session was opened with,
    /// used by the statement layer to size result-set caches and decide
    /// blob/clob host-type mapping.
    pub fn opts(&self) -> Opts {
        self.lock().opts.clone()
    }

    pub fn is_autocommit(&self) -> bool {
        self.lock().autocommit
    }

    /// `Xauto_commit` control command.
    pub fn set_autocommit(&self, on: bool) -> Result<()> {
        let mut guard = self.lock();
        send_control(&mut guard, &format!("auto_commit {}", on as u8))?;
        guard.autocommit = on;
        Ok(())
    }

    /// `Xreply_size` control command.
    pub fn set_reply_size(&self, size: i64) -> Result<()> {
        let mut guard = self.lock();
        send_control(&mut guard, &format!("reply_size {size}"))?;
        guard.reply_size = size;
        Ok(())
    }

    pub fn reply_size(&self) -> i64 {
        self.lock().reply_size
    }

    /// Server-side query timeout. Recent servers accept
    /// `sys.setquerytimeout`; this falls back to the older
    /// `sys.settimeout` the first time the new call errors, per the
    /// version-detection-via-error-fallback strategy recorded in
    /// SPEC_FULL.md §5.
    pub fn set_query_timeout(&self, seconds: u32) -> Result<()> {
        let mut guard = self.lock();
        let modern = format!("call sys.setquerytimeout({seconds});");
        match run_simple_statement(&mut guard, &modern) {
            Ok(()) => Ok(()),
            Err(Error::Sql(_)) | Err(Error::SqlChain { .. }) => {
                let legacy = format!("call sys.settimeout({seconds});");
                run_simple_statement(&mut guard, &legacy)
            }
            Err(other) => Err(other),
        }
    }

    /// Snapshot of warnings accumulated since the last `clear_warnings`
    ///.
    pub fn warnings(&self) -> Vec<Warning> {
        self.lock().warnings.clone()
    }

    pub fn clear_warnings(&self) {
        self.lock().warnings.clear();
    }

    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Marks the session closed; any thread blocked in a read sees the flag
    /// on its next check and the next call fails with
    /// `Error::Connection(ConnectionError::Closed)`.
    pub fn abort(&self) {
        let mut guard = self.lock();
        guard.closed.store(true, Ordering::SeqCst);
        let _ = guard.stream.shutdown(std::net::Shutdown::Both);
        cascade_close_statements(&mut guard);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.load(Ordering::SeqCst)
    }

    /// Graceful close: `Xclose` the connection, then mark it closed
    /// locally regardless of the server's reply.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        let result = send_control(&mut guard, "close");
        guard.closed.store(true, Ordering::SeqCst);
        cascade_close_statements(&mut guard);
        result
    }

    /// Sends a `close <id>` control command to release server-side
    /// result-set state.
    pub(crate) fn close_result(&self, id: i64) -> Result<()> {
        let mut guard = self.lock();
        if guard.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        send_control(&mut guard, &format!("close {id}"))
    }

    /// Sends a `release <id>` control command to release a prepared
    /// statement's server-side handle.
    pub(crate) fn release_prepared(&self, id: i64) -> Result<()> {
        let mut guard = self.lock();
        if guard.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        send_control(&mut guard, &format!("release {id}"))
    }

    /// Runs a `PREPARE` statement with a temporarily raised fetch size so
    /// the descriptor result set fits in a single block, restoring the session's reply size on every exit path.
    pub(crate) fn prepare(
        &self,
        text: &str,
    ) -> Result<(i64, Vec<crate::protocol::ColumnMeta>, Vec<Row>)> {
        let previous = self.reply_size();
        self.set_reply_size(crate::constant::PREPARE_FETCH_SIZE)?;
        let result = crate::dispatcher::run_prepare_turn(self, &format!("PREPARE {text}"));
        self.set_reply_size(previous)?;
        result
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let guard = self.lock();
        guard.stream.set_read_timeout(timeout)?;
        guard.stream.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Registers a weak handle a statement uses to learn its session has
    /// gone away; pruned lazily on every registration.
    pub fn register_statement(&self, flag: Weak<Mutex<bool>>) {
        let mut guard = self.lock();
        guard.statements.retain(|w| w.strong_count() > 0);
        guard.statements.push(flag);
    }

    /// Registers the callback invoked when the server requests a `COPY
    /// ... FROM STDIN`-style upload.
    pub fn set_upload_handler(&self, handler: impl UploadHandler + 'static) {
        self.lock().upload_handler = Some(Box::new(handler));
    }

    /// Registers the callback invoked when the server requests a `COPY
    /// ... INTO STDOUT`-style download.
    pub fn set_download_handler(&self, handler: impl DownloadHandler + 'static) {
        self.lock().download_handler = Some(Box::new(handler));
    }

    /// Runs one full request/response turn: writes `text` wrapped in the
    /// session's query template, then drains lines up to the prompt,
    /// returning them for the dispatcher to interpret. Bumps the sequence
    /// counter so result sets created before this turn know a new query has
    /// since been issued.
    /// Returns the raw non-prompt, non-info lines of the turn together with
    /// the session's sequence number after this turn, so the dispatcher can
    /// stamp any `ResultSet` it builds with the sequence it was created
    /// under.
    pub fn turn(&self, text: &str, is_control: bool) -> Result<(Vec<String>, u64)> {
        let mut guard = self.lock();
        if guard.closed.load(Ordering::SeqCst) {
            return Err(Error::Connection(ConnectionError::Closed));
        }
        guard.sequence += 1;
        if is_control {
            write_control(&mut guard, text)?;
        } else {
            write_query(&mut guard, text)?;
        }
        let lines = read_turn_lines(&mut guard)?;
        Ok((lines, guard.sequence))
    }

    /// Opens a fresh `Statement` bound to this session.
    pub fn statement(&self) -> crate::statement::Statement {
        crate::statement::Statement::new(self)
    }

    /// Runs `PREPARE` and returns a handle bound to the server-side plan
    ///.
    pub fn prepare_statement(&self, text: &str) -> Result<crate::prepared::PreparedStatement> {
        crate::prepared::PreparedStatement::prepare(self, text)
    }

    /// Default cache size for a newly created result set: the session's
    /// negotiated reply size, or the protocol default if none was set.
    pub fn default_cache_size(&self) -> i64 {
        let guard = self.lock();
        if guard.reply_size > 0 {
            guard.reply_size
        } else {
            crate::constant::DEFAULT_REPLY_SIZE
        }
    }
}

/// Drains the weak statement registry, marking every still-live statement's
/// shared flag closed.
fn cascade_close_statements(guard: &mut SessionInner) {
    for weak in guard.statements.drain(..) {
        if let Some(flag) = weak.upgrade() {
            *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
        }
    }
}

fn write_query(guard: &mut SessionInner, text: &str) -> Result<()> {
    guard.writer.write_query(text)
}

fn write_control(guard: &mut SessionInner, text: &str) -> Result<()> {
    guard.writer.write_control(text)
}

/// Services one server-initiated file-transfer request. The
/// current line is the `*`-prefixed request marker; the actual command is
/// the next line, followed by a fake prompt the server inserts before the
/// transfer itself begins.
fn handle_file_transfer(guard: &mut SessionInner) -> Result<()> {
    guard.reader.advance()?;
    let command_line = guard.reader.current().to_string();
    let command = transfer::parse_transfer_command(&command_line)?;
    guard.reader.advance()?; // the fake prompt preceding the transfer body

    match command {
        TransferCommand::UploadText { path, .. } => run_upload(guard, &path, false),
        TransferCommand::UploadBinary { path } => run_upload(guard, &path, true),
        TransferCommand::DownloadText { path } => run_download(guard, &path, false),
        TransferCommand::DownloadBinary { path } => run_download(guard, &path, true),
    }
}

fn run_upload(guard: &mut SessionInner, path: &str, binary: bool) -> Result<()> {
    let Some(mut handler) = guard.upload_handler.take() else {
        guard.writer.write_raw(NO_UPLOAD_HANDLER.as_bytes())?;
        return Ok(());
    };
    let mut writer = guard.stream.try_clone()?;
    let result = {
        let mut stream = UploadStream::new(&mut writer, None);
        let outcome = handler.handle(path, binary, &mut stream);
        match outcome {
            Ok(()) => stream.finish(),
            Err(e) => stream.send_error(&e.to_string()),
        }
    };
    guard.upload_handler = Some(handler);
    result
}

fn run_download(guard: &mut SessionInner, path: &str, binary: bool) -> Result<()> {
    let Some(mut handler) = guard.download_handler.take() else {
        guard.writer.write_raw(NO_DOWNLOAD_HANDLER.as_bytes())?;
        return Ok(());
    };
    let mut body = Vec::new();
    loop {
        guard.reader.advance()?;
        if guard.reader.current().is_empty() {
            break;
        }
        body.push(guard.reader.current().to_string());
    }
    let result = {
        let mut stream = DownloadStream::new(&body, !binary);
        handler.handle(path, binary, &mut stream)
    };
    guard.download_handler = Some(handler);
    result
}

fn read_turn_lines(guard: &mut SessionInner) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        guard.reader.advance()?;
        match guard.reader.line_type() {
            LineType::Prompt => break,
            LineType::Info => {
                let seq = guard.sequence;
                guard
                    .warnings
                    .push(Warning { text: guard.reader.current().to_string(), sequence: seq });
            }
            LineType::FileTransfer => handle_file_transfer(guard)?,
            _ => lines.push(guard.reader.current().to_string()),
        }
    }
    let errors: Vec<&str> = lines
        .iter()
        .filter(|l| l.starts_with('!'))
        .map(String::as_str)
        .collect();
    if !errors.is_empty() {
        return Err(Error::from_sql_lines(&errors));
    }
    Ok(lines)
}

/// Sends a control command and discards its (normally empty) reply,
/// surfacing the first error line if the server rejected it.
fn send_control(guard: &mut SessionInner, text: &str) -> Result<()> {
    write_control(guard, text)?;
    let lines = read_turn_lines(guard)?;
    debug_assert!(
        lines.iter().all(|l| l.starts_with('#')),
        "control command reply carried unexpected line types"
    );
    Ok(())
}

/// Runs a one-shot statement for internal bookkeeping use (query-timeout
/// version probing) without going through the public dispatcher.
fn run_simple_statement(guard: &mut SessionInner, text: &str) -> Result<()> {
    write_query(guard, text)?;
    read_turn_lines(guard).map(|_| ())
}

enum HandshakeOutcome {
    Ready {
        language: Language,
        accepted: HandshakeOptions,
    },
    Redirect(String),
}

fn run_handshake(
    reader: &mut LineReader<BufReader<TcpStream>>,
    mut write_half: TcpStream,
    opts: &Opts,
) -> Result<HandshakeOutcome> {
    reader.advance()?;
    let challenge: Challenge = handshake::parse_challenge(reader.current())?;

    let algorithm = if let Some(forced) = &opts.hash {
        forced.as_str()
    } else {
        handshake::pick_digest_algorithm(&challenge)?
    };
    let digest = handshake::compute_digest(algorithm, &opts.password, &challenge.salt)?;
    let wanted = WantedOptions::from_opts(opts);
    let login = handshake::build_login_block(&challenge, opts, &digest, &wanted);

    write_half.write_all(login.as_bytes())?;
    write_half.write_all(b"\n")?;
    write_half.flush()?;

    let mut lines = Vec::new();
    loop {
        reader.advance()?;
        if matches!(reader.line_type(), LineType::Prompt) {
            break;
        }
        lines.push(reader.current().to_string());
    }
    let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();

    match handshake::parse_handshake_response(&borrowed) {
        HandshakeResponse::Ok { warnings, accepted } => {
            for w in warnings {
                log::warn!("server handshake warning: {w}");
            }
            Ok(HandshakeOutcome::Ready {
                language: opts.language,
                accepted,
            })
        }
        HandshakeResponse::Redirect(target) => Ok(HandshakeOutcome::Redirect(target)),
        HandshakeResponse::Error(msg) => Err(Error::Auth(msg)),
    }
}

/// Implements the result-set cache's block-fetch callback by issuing the
/// `Xexport id offset amount` control command and reading the `&6`
/// continuation block back.
pub struct SessionBlockSource<'a> {
    pub session: &'a Session,
}

impl BlockSource for SessionBlockSource<'_> {
    fn fetch_block(&mut self, id: i64, offset: i64, size: i64) -> Result<Vec<Row>> {
        let mut guard = self.session.lock();
        if guard.closed.load(Ordering::SeqCst) {
            return Err(Error::Connection(ConnectionError::Closed));
        }
        write_control(&mut guard, &format!("export {id} {offset} {size}"))?;

        guard.reader.advance()?;
        let soh = parse_start_of_header(guard.reader.current())?;
        let rowcount = match soh {
            StartOfHeader::QBlock { rowcount, .. } => rowcount,
            other => {
                return Err(Error::protocol_parse(
                    0,
                    format!("expected block header in export reply, got {other:?}"),
                ));
            }
        };

        let mut rows = Vec::with_capacity(rowcount as usize);
        for _ in 0..rowcount {
            guard.reader.advance()?;
            rows.push(crate::protocol::row::parse_row(guard.reader.current())?);
        }

        if let Some(err) = guard.reader.discard_remainder()? {
            return Err(Error::from_sql_lines(&[err.as_str()]));
        }
        Ok(rows)
    }

    fn sequence(&self) -> u64 {
        self.session.sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader as StdBufReader};
    use std::net::TcpListener;
    use std::thread;

    /// Spins up a loopback TCP listener that plays a scripted MAPI
    /// handshake + single query turn, exercising `Session::connect` and
    /// `Session::turn` without a real MonetDB server.
    fn spawn_fake_server(script: Vec<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut write_half = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);

            write_half
                .write_all(b"salt123:merovingian:9:SHA512,SHA256,SHA1,MD5:LIT:SHA512:\n")
                .unwrap();

            let mut login = String::new();
            reader.read_line(&mut login).unwrap();

            write_half.write_all(b"^\n").unwrap();

            for line in script {
                write_half.write_all(line.as_bytes()).unwrap();
                write_half.write_all(b"\n").unwrap();
            }
        });
        port
    }

    #[test]
    fn connect_runs_handshake_and_applies_wanted_followups() {
        let port = spawn_fake_server(vec!["#ok", "^"]);
        let mut opts = Opts::default();
        opts.host = "127.0.0.1".to_string();
        opts.port = port;
        opts.user = "monetdb".to_string();
        opts.password = "monetdb".to_string();
        opts.database = "demo".to_string();

        let session = Session::connect(opts).unwrap();
        assert!(session.is_autocommit());
        assert!(!session.is_closed());
    }

    #[test]
    fn abort_marks_session_closed() {
        let port = spawn_fake_server(vec!["#ok", "^"]);
        let mut opts = Opts::default();
        opts.host = "127.0.0.1".to_string();
        opts.port = port;
        let session = Session::connect(opts).unwrap();
        session.abort();
        assert!(session.is_closed());
        assert!(matches!(
            session.turn("select 1", false),
            Err(Error::Connection(ConnectionError::Closed))
        ));
    }
}
