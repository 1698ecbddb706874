//! Single-endpoint HTTP/1.1 client connection.
use bytes::BytesMut;
use log::debug;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio::sync::OwnedSemaphorePermit;

use crate::body::BodyReader;
use crate::client::error::ClientError;
use crate::headers::parse_content_length;
use crate::http::{Request, Response, StatusCode, has_body};
use crate::stream::{Reader, Writer, split};

/// One reusable connection to a `(scheme, authority)` endpoint.
///
/// A connection is held by at most one fetch at a time: the manager sets
/// the lock flag before calling [`fetch`][Connection::fetch], which
/// clears it on every exit path. The reaper skips locked connections.
pub struct Connection {
    io: tokio::sync::Mutex<Io>,
    locked: AtomicBool,
    closing: AtomicBool,
    last_activity: Mutex<Instant>,
    user_agent: String,
    peer: String,
}

struct Io {
    reader: Reader,
    writer: Writer,
}

impl Connection {
    /// Open a TCP connection to `authority` (port defaulted per scheme).
    ///
    /// TLS transports are out of scope here; wrap one yourself and use
    /// [`from_streams`][Connection::from_streams].
    pub async fn open(
        scheme: &str,
        authority: &str,
        user_agent: &str,
    ) -> Result<Connection, ClientError> {
        let port = match scheme {
            "http" => 80u16,
            other => {
                return Err(ClientError::Protocol(format!(
                    "cannot open {other:?} endpoints without an external transport"
                )));
            }
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, p)) if !p.is_empty() => (
                host,
                p.parse()
                    .map_err(|_| ClientError::Protocol(format!("bad authority {authority:?}")))?,
            ),
            Some((host, _)) => (host, port),
            None => (authority, port),
        };

        let socket = TcpStream::connect((host, port)).await?;
        let peer = socket.peer_addr().ok();
        let (reader, mut writer) = split(socket);
        if let Some(peer) = peer {
            writer.set_peer_addr(peer);
        }
        Ok(Self::from_streams(reader, writer, user_agent))
    }

    /// Build a connection over an already-established transport.
    pub fn from_streams(reader: Reader, writer: Writer, user_agent: &str) -> Connection {
        let peer = writer
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_owned());
        Connection {
            io: tokio::sync::Mutex::new(Io { reader, writer }),
            locked: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            user_agent: user_agent.to_owned(),
            peer,
        }
    }

    /// Whether the connection is closed or closing.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Whether a fetch currently owns this connection.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Free for the next fetch: neither closing nor locked.
    pub fn is_available(&self) -> bool {
        !self.is_closing() && !self.is_locked()
    }

    /// Monotonic instant of the last I/O boundary crossing.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().expect("last_activity lock")
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.last_activity.lock().expect("last_activity lock") = Instant::now();
    }

    /// Claim the connection for one fetch. Returns `false` when another
    /// fetch won the race.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Mark closing and shut the write side down if no fetch holds it.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        if let Ok(mut io) = self.io.try_lock() {
            io.writer.close();
        }
        debug!("connection to {} closed", self.peer);
    }

    /// Send `request` and read its response.
    ///
    /// The semaphore permit (when the endpoint is bounded) and the lock
    /// flag are released on every exit path, including errors and
    /// timeouts. Any failed exchange closes the connection: after a
    /// timeout, a transport error or a protocol violation its framing
    /// state is indeterminate and the socket cannot be reused.
    pub async fn fetch(
        &self,
        request: &mut Request,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<Response, ClientError> {
        debug_assert!(self.is_locked());
        // dropped on every exit path below
        let _permit = permit;
        let _unlock = Unlock(self);

        if self.is_closing() {
            return Err(ClientError::Connection(io::ErrorKind::BrokenPipe.into()));
        }

        let result = match request.timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.exchange(request)).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        Err(ClientError::Timeout(format!("request to {}", self.peer)))
                    }
                }
            }
            None => self.exchange(request).await,
        };

        if result.is_err() {
            self.close();
        }
        result
    }

    async fn exchange(&self, request: &mut Request) -> Result<Response, ClientError> {
        let started = Instant::now();
        let mut io = self.io.lock().await;
        self.touch();

        // ===== Request head =====

        if !request.headers.contains("host") {
            let authority = request.authority().to_owned();
            request.headers.set("host", authority);
        }
        if !request.headers.contains("user-agent") {
            request.headers.set("user-agent", self.user_agent.as_str());
        }
        if !request.headers.contains("connection") {
            request.headers.set("connection", "keep-alive");
        }
        let chunked_body = apply_body_headers(request);

        io.writer.write(
            format!("{} {} HTTP/1.1\r\n", request.method, request.relative_url()).as_bytes(),
        );
        io.writer.write(request.headers.http_encode().as_bytes());
        io.writer.write(b"\r\n");

        // ===== Request body =====

        if let Some(body) = &request.body {
            io.writer.write(body);
        } else if let Some(producer) = &mut request.body_producer {
            loop {
                let block = producer.next().await?;
                match block {
                    Some(block) if chunked_body => {
                        if !block.is_empty() {
                            io.writer
                                .write(format!("{:x}\r\n", block.len()).as_bytes());
                            io.writer.write(&block);
                            io.writer.write(b"\r\n");
                        }
                    }
                    Some(block) => io.writer.write(&block),
                    None => break,
                }
            }
            if chunked_body {
                io.writer.write(b"0\r\n\r\n");
            }
        }
        io.writer.drain().await?;

        // ===== Response head =====

        let head = io.reader.read_until(b"\r\n\r\n").await?;
        let mut lines = split_head(&head);
        let status_line = lines.next().unwrap_or_default();
        if status_line.is_empty() {
            return Err(ClientError::Connection(io::ErrorKind::UnexpectedEof.into()));
        }

        let status = parse_status_line(status_line)?;
        let mut response = Response::new(status);
        response
            .headers
            .parse_lines(lines)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        // ===== Response body =====

        let body_reader = select_body_reader(request, &response)?;
        if let Some(mut body) = body_reader {
            let mut accumulated = BytesMut::new();
            while let Some(block) = body.next(&mut io.reader).await? {
                match &mut request.body_streaming_callback {
                    Some(callback) => callback(&block),
                    None => accumulated.extend_from_slice(&block),
                }
            }
            response.body = accumulated.freeze();
        }

        if response
            .headers
            .values("connection")
            .iter()
            .any(|v| v.eq_ignore_ascii_case("close"))
        {
            self.closing.store(true, Ordering::Release);
            io.writer.close();
        }

        self.touch();
        debug!(
            "{} {} -> {} in {:?}",
            request.method,
            self.peer,
            response.status,
            started.elapsed()
        );
        Ok(response)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("locked", &self.is_locked())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

/// Clears the lock flag when a fetch leaves by any path.
struct Unlock<'a>(&'a Connection);

impl Drop for Unlock<'_> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

/// Decide the request framing headers; returns whether the body goes out
/// chunked.
///
/// Rule order: an explicit user header wins; then in-memory body bytes;
/// then a sized producer; then an unsized producer (chunked); else
/// `content-length: 0`.
fn apply_body_headers(request: &mut Request) -> bool {
    if request.headers.contains("content-length")
        || request.headers.contains("transfer-encoding")
    {
        return request
            .headers
            .values("transfer-encoding")
            .last()
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    }
    if let Some(body) = &request.body {
        request.headers.set("content-length", body.len());
        return false;
    }
    if let Some(producer) = &request.body_producer {
        return match producer.size() {
            Some(size) => {
                request.headers.set("content-length", size);
                false
            }
            None => {
                request.headers.set("transfer-encoding", "chunked");
                true
            }
        };
    }
    request.headers.set("content-length", 0u64);
    false
}

/// `HTTP/<1.x> <3-digit status> <reason>`; only 1.x is accepted.
fn parse_status_line(line: &[u8]) -> Result<StatusCode, ClientError> {
    let malformed = || {
        ClientError::Protocol(format!(
            "malformed status line: {:?}",
            String::from_utf8_lossy(line)
        ))
    };

    let mut tokens = line.splitn(3, |&b| b == b' ');
    let version = tokens.next().ok_or_else(malformed)?;
    let status = tokens.next().ok_or_else(malformed)?;

    let digits = version.strip_prefix(b"HTTP/").ok_or_else(malformed)?;
    let version = crate::http::Version::from_digits(digits).ok_or_else(malformed)?;
    if version.major != 1 {
        return Err(ClientError::Protocol(format!(
            "unsupported response version HTTP/{}.{}",
            version.major, version.minor
        )));
    }

    if status.len() != 3 || !status.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let code: u16 = std::str::from_utf8(status)
        .expect("digits are ascii")
        .parse()
        .expect("three digits fit u16");
    StatusCode::from_u16(code).map_err(|_| malformed())
}

/// Body reader for the response, honoring the server-side suppression
/// rules; `None` when the response carries no body.
fn select_body_reader(
    request: &Request,
    response: &Response,
) -> Result<Option<BodyReader>, ClientError> {
    if !has_body(request.method, response.status) {
        return Ok(None);
    }

    let transfer_encoding = response.headers.values("transfer-encoding");
    if !transfer_encoding.is_empty() {
        if !transfer_encoding
            .last()
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
        {
            return Err(ClientError::Protocol(
                "chunked is not the final transfer coding".to_owned(),
            ));
        }
        return Ok(Some(BodyReader::chunked()));
    }

    match response.headers.get("content-length") {
        Some(value) => {
            let size = parse_content_length(value).ok_or_else(|| {
                ClientError::Protocol(format!("bad content-length {value:?}"))
            })?;
            Ok(Some(BodyReader::buffered(size)))
        }
        None => Ok(None),
    }
}

/// CRLF line iterator over a response head.
fn split_head(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(head);
    std::iter::from_fn(move || {
        let line = rest?;
        match line.windows(2).position(|w| w == b"\r\n") {
            Some(at) => {
                rest = Some(&line[at + 2..]);
                Some(&line[..at])
            }
            None => {
                rest = None;
                Some(line)
            }
        }
    })
}

// ===== Test =====
