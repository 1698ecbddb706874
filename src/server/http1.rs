//! HTTP/1.1 server connection pipeline.
//!
//! One pipeline drives one connection: it reads a request, routes it,
//! runs the handler, writes the response and loops while keep-alive
//! holds. All per-exchange state lives in the [`Exchange`] handed to the
//! handler.
use bytes::Bytes;
use log::{debug, error, info};
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use crate::body::{BodyError, BodyReader};
use crate::error::HttpError;
use crate::headers::{Headers, title_case};
use crate::http::{Method, Request, StatusCode, Version, parse_query_strict, unquote_plus};
use crate::matches;
use crate::server::router::{Route, Router, RoutingError};
use crate::server::ServerConfig;
use crate::stream::{Reader, Writer};

/// Per-connection HTTP/1.1 protocol engine.
pub struct Http1Pipeline {
    reader: Reader,
    writer: Writer,
    router: Arc<dyn Router>,
    config: Arc<ServerConfig>,
    peer: String,
}

/// Outcome of one exchange: keep the connection or close it.
enum Flow {
    KeepAlive,
    Close,
}

impl Http1Pipeline {
    pub fn new(
        reader: Reader,
        writer: Writer,
        router: Arc<dyn Router>,
        config: Arc<ServerConfig>,
    ) -> Http1Pipeline {
        let peer = writer
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_owned());
        Http1Pipeline {
            reader,
            writer,
            router,
            config,
            peer,
        }
    }

    /// Serve exchanges until either peer signals close.
    pub async fn run(mut self) {
        debug!("{} connected", self.peer);
        loop {
            match self.process_one().await {
                Ok(Flow::KeepAlive) => continue,
                Ok(Flow::Close) => break,
                Err(err) => {
                    // broken transport, nothing can be sent back
                    debug!("{} transport error: {err}", self.peer);
                    break;
                }
            }
        }
        self.writer.close();
        debug!("{} disconnected", self.peer);
    }

    /// Drive a single request/response exchange.
    async fn process_one(&mut self) -> io::Result<Flow> {
        // ===== Receive request head =====

        let head = match tokio::time::timeout(
            self.config.read_timeout,
            self.reader.read_until(b"\r\n\r\n"),
        )
        .await
        {
            Ok(head) => head?,
            Err(_elapsed) => {
                info!("{} request waiting timeout", self.peer);
                self.error_response(StatusCode::REQUEST_TIMEOUT, None).await?;
                return Ok(Flow::Close);
            }
        };

        let mut parts = split_crlf(&head);
        let request_line = parts.next().unwrap_or_default();

        if request_line.is_empty() {
            // no request line means the peer went away
            info!("{} no request line, at EOF", self.peer);
            return Ok(Flow::Close);
        }

        // ===== Request line =====

        let Some((method, target, version)) = parse_request_line(request_line) else {
            info!("{} request line malformed", self.peer);
            self.error_response(StatusCode::BAD_REQUEST, None).await?;
            return Ok(Flow::Close);
        };

        let raw_target = String::from_utf8_lossy(target);
        let (raw_path, raw_query) = match raw_target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (raw_target.as_ref(), ""),
        };
        let path = unquote_plus(raw_path);
        let query = if raw_query.is_empty() {
            Default::default()
        } else {
            // malformed query is ignored, not an error
            parse_query_strict(raw_query).unwrap_or_else(|| {
                info!("{} malformed query ignored", self.peer);
                Default::default()
            })
        };

        // ===== Header fields =====

        let mut headers = Headers::new();
        if let Err(err) = headers.parse_lines(parts) {
            info!("{} malformed header field: {err}", self.peer);
            self.error_response(StatusCode::BAD_REQUEST, None).await?;
            return Ok(Flow::Close);
        }

        // ===== Body length validation =====

        let body = match validate_body_length(&mut headers) {
            Ok(body) => body,
            Err(()) => {
                info!("{} invalid message framing headers", self.peer);
                self.error_response(StatusCode::BAD_REQUEST, None).await?;
                return Ok(Flow::Close);
            }
        };

        // ===== Keep alive =====

        let connection = headers.values("connection");
        let keep_alive = match version {
            Version { major: 1, minor: 1 } => {
                !connection.iter().any(|v| v.eq_ignore_ascii_case("close"))
            }
            Version { major: 1, minor: 0 } => connection
                .iter()
                .any(|v| v.eq_ignore_ascii_case("keep-alive")),
            _ => false,
        };

        let request = Request::from_parts(method, version, path, query, headers);
        debug!("{} {} {}", self.peer, method, request.path());

        let mut exchange = Exchange {
            request,
            body,
            reader: &mut self.reader,
            writer: &mut self.writer,
            agent: &self.config.server_agent,
            keep_alive,
            response_sent: false,
        };

        // ===== Routing =====

        let flow = match self.router.find_route(exchange.request.path()) {
            Err(RoutingError { .. }) => {
                info!("{} route not found", self.peer);
                exchange
                    .error(StatusCode::NOT_FOUND, None)
                    .await?;
                exchange.flow()
            }
            Ok(route) if !route.handler.allowed_methods().contains(method) => {
                info!("{} method {} not allowed", self.peer, method);
                let mut allow = Headers::new();
                allow.set("allow", route.handler.allowed_methods().to_allow_value());
                exchange
                    .error(StatusCode::METHOD_NOT_ALLOWED, Some(allow))
                    .await?;
                exchange.flow()
            }
            Ok(route) => dispatch(&mut exchange, &route, &self.peer).await?,
        };

        // ===== Cleanup =====

        if matches!(flow, Flow::KeepAlive) && !exchange.body.is_complete() {
            // unread request body would corrupt the next exchange
            match exchange.body.drain(&mut *exchange.reader).await {
                Ok(()) => {}
                Err(BodyError::Io(err)) => return Err(err),
                Err(err) => {
                    debug!("{} failed draining request body: {err}", self.peer);
                    return Ok(Flow::Close);
                }
            }
        }

        Ok(flow)
    }

    /// Error response outside any exchange; always closes.
    async fn error_response(
        &mut self,
        status: StatusCode,
        extra: Option<Headers>,
    ) -> io::Result<()> {
        write_response_head(
            &mut self.writer,
            status,
            extra.unwrap_or_default(),
            &self.config.server_agent,
            false,
            Some(0),
        );
        self.writer.drain().await
    }
}

impl std::fmt::Debug for Http1Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http1Pipeline")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Run the routed handler, covering 100-continue and failure recovery.
async fn dispatch(
    exchange: &mut Exchange<'_>,
    route: &Route,
    peer: &str,
) -> io::Result<Flow> {
    // ===== 100-continue =====

    let expects_continue = exchange
        .request
        .headers
        .values("expect")
        .iter()
        .any(|v| v.eq_ignore_ascii_case("100-continue"));

    if expects_continue {
        if !route.handler.can_continue(exchange).await {
            info!("{peer} expectation refused");
            if !exchange.response_sent {
                exchange
                    .error(StatusCode::EXPECTATION_FAILED, None)
                    .await?;
            }
            return Ok(exchange.flow());
        }
        if let Err(err) = exchange.send_interim(StatusCode::CONTINUE).await {
            match err.into_transport() {
                Ok(io_err) => return Err(io_err),
                Err(err) => return Err(io::Error::other(err)),
            }
        }
    }

    // ===== Handler =====

    match route.handler.call(exchange, &route.args).await {
        Ok(()) => {
            if !exchange.response_sent {
                error!("{peer} handler finished without a response");
                exchange
                    .error(StatusCode::INTERNAL_SERVER_ERROR, None)
                    .await?;
            }
        }
        Err(err) => match err.into_transport() {
            Ok(io_err) => return Err(io_err),
            Err(err) => {
                error!("{peer} error during response handling: {err}");
                if exchange.response_sent {
                    // the wire is already committed to another response
                    return Ok(Flow::Close);
                }
                let (status, extra) = err.response_parts();
                exchange.error(status, extra.cloned()).await?;
            }
        },
    }

    Ok(exchange.flow())
}

// ===== Exchange =====

/// One request/response exchange, handed to the [`Handler`].
///
/// Gives the handler the parsed request, the lazy body reader and the
/// single-shot response writer.
///
/// [`Handler`]: crate::server::Handler
pub struct Exchange<'a> {
    request: Request,
    body: BodyReader,
    reader: &'a mut Reader,
    writer: &'a mut Writer,
    agent: &'a str,
    keep_alive: bool,
    response_sent: bool,
}

impl Exchange<'_> {
    /// The request under service.
    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Whether this connection will serve another exchange.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Whether the non-interim response went out already.
    #[inline]
    pub fn response_sent(&self) -> bool {
        self.response_sent
    }

    /// The next request body block, `None` at the end of the body.
    pub async fn next_block(&mut self) -> Result<Option<Bytes>, BodyError> {
        self.body.next(&mut *self.reader).await
    }

    /// Read the remaining request body into one buffer.
    pub async fn read_body(&mut self) -> Result<Bytes, BodyError> {
        self.body.read_to_end(&mut *self.reader).await
    }

    /// Trailer fields of a chunked request body, once complete.
    pub fn trailers(&self) -> Option<&Headers> {
        self.body.trailers()
    }

    /// Send the response for this exchange.
    ///
    /// Injects `date`, `server` and `connection`; a user-supplied
    /// `connection: close` turns keep-alive off and is absorbed into the
    /// injected field. At most one response with status >= 200 may be
    /// sent per exchange; interim `1xx` statuses go through
    /// [`send_interim`][Exchange::send_interim] instead.
    ///
    /// # Errors
    ///
    /// Fails with a transport error when the peer is gone, and with an
    /// internal error on double sends or statuses outside the reason
    /// table.
    pub async fn send_response(
        &mut self,
        status: StatusCode,
        headers: Option<Headers>,
        body: Option<&[u8]>,
    ) -> Result<(), HttpError> {
        if status.is_informational() {
            return Err(HttpError::internal("use send_interim for 1xx responses"));
        }
        if self.response_sent {
            return Err(HttpError::internal("response was already sent"));
        }
        if status.reason().is_none() {
            return Err(HttpError::internal("status outside the reason table"));
        }

        let mut headers = headers.unwrap_or_default();
        let close_requested = headers
            .values("connection")
            .iter()
            .any(|v| v.eq_ignore_ascii_case("close"));
        if close_requested {
            self.keep_alive = false;
            headers.remove("connection");
        }

        write_response_head(
            self.writer,
            status,
            headers,
            self.agent,
            self.keep_alive,
            Some(body.map_or(0, <[u8]>::len) as u64),
        );
        if let Some(body) = body {
            self.writer.write(body);
        }
        self.writer.drain().await?;

        self.response_sent = true;
        Ok(())
    }

    /// Send an interim `1xx` response; does not consume the exchange's
    /// single response.
    pub async fn send_interim(&mut self, status: StatusCode) -> Result<(), HttpError> {
        if !status.is_informational() {
            return Err(HttpError::internal("interim status must be 1xx"));
        }
        let reason = status
            .reason()
            .ok_or_else(|| HttpError::internal("status outside the reason table"))?;
        self.writer
            .write(format!("HTTP/1.1 {status} {reason}\r\n\r\n").as_bytes());
        self.writer.drain().await?;
        Ok(())
    }

    /// Error response inside the exchange, keep-alive permitting reuse.
    async fn error(
        &mut self,
        status: StatusCode,
        extra: Option<Headers>,
    ) -> io::Result<()> {
        match self.send_response(status, extra, None).await {
            Ok(()) => Ok(()),
            Err(err) => match err.into_transport() {
                Ok(io_err) => Err(io_err),
                Err(err) => {
                    error!("failed to send error response: {err}");
                    self.keep_alive = false;
                    Ok(())
                }
            },
        }
    }

    fn flow(&self) -> Flow {
        if self.keep_alive {
            Flow::KeepAlive
        } else {
            Flow::Close
        }
    }
}

impl std::fmt::Debug for Exchange<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("request", &self.request)
            .field("keep_alive", &self.keep_alive)
            .field("response_sent", &self.response_sent)
            .finish_non_exhaustive()
    }
}

/// Queue a response head: status line, user fields, injected fields.
///
/// Field names go out title-cased.
fn write_response_head(
    writer: &mut Writer,
    status: StatusCode,
    mut headers: Headers,
    agent: &str,
    keep_alive: bool,
    content_length: Option<u64>,
) {
    let reason = status.reason().unwrap_or("Unknown");
    writer.write(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());

    headers.set("date", SystemTime::now());
    headers.set("server", agent);
    headers.set("connection", if keep_alive { "keep-alive" } else { "close" });
    if let Some(len) = content_length {
        headers.set("content-length", len);
    }

    for (name, value) in headers.fields() {
        writer.write(title_case(name).as_bytes());
        writer.write(b": ");
        writer.write(value.as_bytes());
        writer.write(b"\r\n");
    }
    writer.write(b"\r\n");
}

// ===== Request parsing =====

/// Iterate CRLF-separated lines of a header block.
///
/// A bare LF is not a separator; it stays in the line and fails header
/// validation there.
fn split_crlf(head: &[u8]) -> impl Iterator<Item = &[u8]> {
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

/// Match the request-line grammar, returning `(method, target, version)`.
///
/// Rejects methods outside the closed set, targets containing raw `%2F`
/// or `%5C`, and anything that fails the target charset.
fn parse_request_line(line: &[u8]) -> Option<(Method, &[u8], Version)> {
    let mut tokens = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|t| !t.is_empty());
    let method = tokens.next()?;
    let target = tokens.next()?;
    let version = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    if method.is_empty() || !method.iter().all(u8::is_ascii_uppercase) {
        return None;
    }
    let method = Method::from_bytes(method)?;

    if !validate_target(target) {
        return None;
    }
    // percent-encoded slash and backslash are a path traversal defense
    if contains(target, b"%2F") || contains(target, b"%5C") {
        return None;
    }

    let version = Version::from_digits(version.strip_prefix(b"HTTP/")?)?;

    Some((method, target, version))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn validate_target(target: &[u8]) -> bool {
    if target == b"*" {
        return true;
    }
    let (path, query) = match target.iter().position(|&b| b == b'?') {
        Some(at) => (&target[..at], Some(&target[at + 1..])),
        None => (target, None),
    };
    validate_path(path) && query.is_none_or(validate_query)
}

/// `path = / ( segment ( / segment )* /? )?` with non-empty segments.
fn validate_path(path: &[u8]) -> bool {
    let Some(mut rest) = path.strip_prefix(b"/") else {
        return false;
    };

    let mut segment_len = 0;
    while let Some(&byte) = rest.first() {
        match byte {
            b'/' => {
                if segment_len == 0 {
                    return false;
                }
                segment_len = 0;
                rest = &rest[1..];
            }
            b'%' => {
                if !matches::is_pct_encoded(rest) {
                    return false;
                }
                segment_len += 1;
                rest = &rest[3..];
            }
            b if matches::is_segment(b) => {
                segment_len += 1;
                rest = &rest[1..];
            }
            _ => return false,
        }
    }
    true
}

fn validate_query(query: &[u8]) -> bool {
    let mut rest = query;
    while let Some(&byte) = rest.first() {
        if byte == b'%' {
            if !matches::is_pct_encoded(rest) {
                return false;
            }
            rest = &rest[3..];
        } else if matches::is_query(byte) {
            rest = &rest[1..];
        } else {
            return false;
        }
    }
    true
}

/// Apply the body-length rules, returning the per-exchange body reader.
///
/// `transfer-encoding` suppresses `content-length`; chunked must be the
/// final coding; `content-length` must be single-valued and match the
/// numeric grammar; absent both, the body is empty.
fn validate_body_length(headers: &mut Headers) -> Result<BodyReader, ()> {
    let transfer_encoding = headers.values("transfer-encoding").to_vec();

    if !transfer_encoding.is_empty() {
        if headers.contains("content-length") {
            headers.remove("content-length");
        }
        if !transfer_encoding
            .last()
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
        {
            return Err(());
        }
        return Ok(BodyReader::chunked());
    }

    let content_length = headers.values("content-length").to_vec();
    match content_length.len() {
        0 => {
            headers.set("content-length", 0u64);
            Ok(BodyReader::buffered(0))
        }
        1 => {
            let size = crate::headers::parse_content_length(&content_length[0]).ok_or(())?;
            Ok(BodyReader::buffered(size))
        }
        _ => Err(()),
    }
}

// ===== Test =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_ok() {
        let (method, target, version) =
            parse_request_line(b"GET /a/b?x=1 HTTP/1.1").unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(target, b"/a/b?x=1");
        assert_eq!(version, Version::HTTP_11);

        assert!(parse_request_line(b"OPTIONS * HTTP/1.1").is_some());
        assert!(parse_request_line(b"GET /  \t HTTP/1.0").is_some());
        assert!(parse_request_line(b"GET /%41 HTTP/1.1").is_some());
    }

    #[test]
    fn test_request_line_rejects() {
        assert!(parse_request_line(b"FOO \x00 HTTP/1.1").is_none());
        assert!(parse_request_line(b"CONNECT / HTTP/1.1").is_none());
        assert!(parse_request_line(b"get / HTTP/1.1").is_none());
        assert!(parse_request_line(b"GET / HTTP/11").is_none());
        assert!(parse_request_line(b"GET / HTTP/1.1 extra").is_none());
        assert!(parse_request_line(b"GET noslash HTTP/1.1").is_none());
        assert!(parse_request_line(b"GET //double HTTP/1.1").is_none());
        // lowercase percent-encoding is outside the grammar
        assert!(parse_request_line(b"GET /%2f HTTP/1.1").is_none());
    }

    #[test]
    fn test_request_line_traversal_defense() {
        assert!(parse_request_line(b"GET /a%2Fb HTTP/1.1").is_none());
        assert!(parse_request_line(b"GET /a%5Cb HTTP/1.1").is_none());
        assert!(parse_request_line(b"GET /?x=%2F HTTP/1.1").is_none());
    }

    #[test]
    fn test_validate_body_length() {
        let mut headers = Headers::new();
        headers.set("transfer-encoding", ["gzip", "chunked"]);
        headers.set("content-length", 4u64);
        let body = validate_body_length(&mut headers).unwrap();
        assert!(matches!(body, BodyReader::Chunked(_)));
        // content-length is dropped in favor of transfer-encoding
        assert!(!headers.contains("content-length"));

        let mut headers = Headers::new();
        headers.set("transfer-encoding", ["chunked", "gzip"]);
        assert!(validate_body_length(&mut headers).is_err());

        let mut headers = Headers::new();
        headers.set("content-length", "007");
        assert!(validate_body_length(&mut headers).is_err());

        let mut headers = Headers::new();
        headers.add("content-length", "4");
        headers.add("content-length", "5");
        assert!(validate_body_length(&mut headers).is_err());

        let mut headers = Headers::new();
        let body = validate_body_length(&mut headers).unwrap();
        assert!(matches!(body, BodyReader::Buffered(_)));
        assert_eq!(headers.get("content-length"), Some("0"));
    }

    #[test]
    fn test_split_crlf() {
        let head = b"GET / HTTP/1.1\r\nHost: x\r\nAccept: */*";
        let lines: Vec<_> = split_crlf(head).collect();
        assert_eq!(lines, vec![&b"GET / HTTP/1.1"[..], b"Host: x", b"Accept: */*"]);
    }
}
