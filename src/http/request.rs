use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::common::BoxFuture;
use crate::headers::Headers;
use crate::http::{Method, Version};

/// Query string mapping, one list of values per key.
pub type QueryMap = HashMap<String, Vec<String>>;

/// Callback invoked with each response body block instead of
/// accumulating, see [`Request::body_streaming_callback`].
pub type BodyCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Streaming request body source with an optional size hint.
///
/// A producer with a known [`size`][BodyProducer::size] is sent with
/// `content-length`; an unsized producer is sent chunked.
pub trait BodyProducer: Send {
    /// Total number of bytes this producer will yield, if known.
    fn size(&self) -> Option<u64>;

    /// The next body block, or `None` at the end of the stream.
    fn next(&mut self) -> BoxFuture<'_, std::io::Result<Option<Bytes>>>;
}

/// HTTP request.
///
/// Used on both sides: the server pipeline builds one per exchange from
/// the wire, the client sends one through [`Client::fetch`].
///
/// The URL-derived fields (scheme, authority, path, query) are kept
/// consistent by [`set_url`][Request::set_url]: the new URL is parsed
/// completely before any field is assigned.
///
/// [`Client::fetch`]: crate::client::Client::fetch
pub struct Request {
    pub method: Method,
    pub version: Version,
    pub headers: Headers,
    /// In-memory request body, mutually exclusive with `body_producer`.
    pub body: Option<Bytes>,
    /// Streaming request body source.
    pub body_producer: Option<Box<dyn BodyProducer>>,
    /// When set, response body blocks are fed here instead of being
    /// accumulated on the [`Response`][crate::http::Response].
    pub body_streaming_callback: Option<BodyCallback>,
    /// Number of redirects already followed for this request.
    pub redirect_count: u32,
    /// Deadline for the whole fetch of this request.
    pub timeout: Option<Duration>,

    url: String,
    scheme: String,
    authority: String,
    path: String,
    query: QueryMap,
    relative_url: String,
}

impl Request {
    /// Build a request from an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidUrl`] when the URL cannot be parsed or carries no
    /// scheme or authority.
    pub fn new(method: Method, url: &str) -> Result<Request, InvalidUrl> {
        let mut request = Request {
            method,
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: None,
            body_producer: None,
            body_streaming_callback: None,
            redirect_count: 0,
            timeout: None,
            url: String::new(),
            scheme: String::new(),
            authority: String::new(),
            path: String::from("/"),
            query: QueryMap::new(),
            relative_url: String::from("/"),
        };
        request.set_url(url)?;
        Ok(request)
    }

    /// `GET` request shorthand.
    #[inline]
    pub fn get(url: &str) -> Result<Request, InvalidUrl> {
        Request::new(Method::Get, url)
    }

    /// Construct a server-side request out of parsed request-line parts.
    pub(crate) fn from_parts(
        method: Method,
        version: Version,
        path: String,
        query: QueryMap,
        headers: Headers,
    ) -> Request {
        Request {
            method,
            version,
            headers,
            body: None,
            body_producer: None,
            body_streaming_callback: None,
            redirect_count: 0,
            timeout: None,
            url: String::new(),
            scheme: String::new(),
            authority: String::new(),
            relative_url: path.clone(),
            path,
            query,
        }
    }

    /// Replace the request URL, updating every derived field.
    ///
    /// Either all of url/scheme/authority/path/query are updated, or, on
    /// error, none.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidUrl`] when the URL cannot be parsed or carries no
    /// scheme or authority.
    pub fn set_url(&mut self, url: &str) -> Result<(), InvalidUrl> {
        let parsed = url::Url::parse(url).map_err(|_| InvalidUrl::new(url))?;

        let scheme = parsed.scheme().to_owned();
        let host = parsed.host_str().ok_or_else(|| InvalidUrl::new(url))?;
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        let path = match parsed.path() {
            "" => "/".to_owned(),
            p => p.to_owned(),
        };
        let relative_url = match parsed.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.clone(),
        };
        let query = parsed
            .query()
            .and_then(parse_query_strict)
            .unwrap_or_default();

        self.url = url.to_owned();
        self.scheme = scheme;
        self.authority = authority;
        self.path = path;
        self.query = query;
        self.relative_url = relative_url;
        Ok(())
    }

    /// The absolute URL this request targets, empty on server requests.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL scheme, e.g. `http`.
    #[inline]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `host` or `host:port`.
    #[inline]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Percent-decoded request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parsed query mapping.
    #[inline]
    pub fn query(&self) -> &QueryMap {
        &self.query
    }

    /// Path plus raw query, as written on the client request line.
    #[inline]
    pub fn relative_url(&self) -> &str {
        &self.relative_url
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("redirect_count", &self.redirect_count)
            .finish_non_exhaustive()
    }
}

// ===== Query parsing =====

/// Percent-decode with `+` treated as space.
pub(crate) fn unquote_plus(value: &str) -> String {
    let spaced = value.replace('+', " ");
    percent_encoding::percent_decode_str(&spaced)
        .decode_utf8_lossy()
        .into_owned()
}

/// Strict query-string parse.
///
/// Pairs are separated by `&` or `;`; every pair must be non-empty and
/// contain `=`. Pairs with an empty value are dropped. Returns `None`
/// when the string violates the strict grammar.
pub(crate) fn parse_query_strict(query: &str) -> Option<QueryMap> {
    let mut map = QueryMap::new();

    for pair in query.split(['&', ';']) {
        if pair.is_empty() {
            return None;
        }
        let (key, value) = pair.split_once('=')?;
        if value.is_empty() {
            continue;
        }
        map.entry(unquote_plus(key))
            .or_default()
            .push(unquote_plus(value));
    }

    Some(map)
}

// ===== Error =====

/// URL rejected by [`Request::set_url`].
#[derive(Debug)]
pub struct InvalidUrl {
    url: String,
}

impl InvalidUrl {
    fn new(url: &str) -> Self {
        Self { url: url.to_owned() }
    }
}

impl std::error::Error for InvalidUrl {}
impl std::fmt::Display for InvalidUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid url: {:?}", self.url)
    }
}

// ===== Test =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_fields() {
        let request = Request::get("http://example.org:8080/a/b?x=1&y=2").unwrap();
        assert_eq!(request.scheme(), "http");
        assert_eq!(request.authority(), "example.org:8080");
        assert_eq!(request.path(), "/a/b");
        assert_eq!(request.relative_url(), "/a/b?x=1&y=2");
        assert_eq!(request.query()["x"], ["1"]);
    }

    #[test]
    fn test_default_port_elided() {
        let request = Request::get("https://example.org/").unwrap();
        assert_eq!(request.authority(), "example.org");
        assert_eq!(request.relative_url(), "/");
    }

    #[test]
    fn test_set_url_atomic() {
        let mut request = Request::get("http://example.org/a").unwrap();
        assert!(request.set_url("not a url").is_err());
        // nothing changed
        assert_eq!(request.url(), "http://example.org/a");
        assert_eq!(request.path(), "/a");
    }

    #[test]
    fn test_query_strict() {
        let map = parse_query_strict("a=1&a=2&b=x+y%21").unwrap();
        assert_eq!(map["a"], ["1", "2"]);
        assert_eq!(map["b"], ["x y!"]);

        assert!(parse_query_strict("a").is_none());
        assert!(parse_query_strict("a=1&&b=2").is_none());
        // blank values are dropped, not an error
        assert_eq!(parse_query_strict("a=").unwrap().len(), 0);
    }

    #[test]
    fn test_unquote_plus() {
        assert_eq!(unquote_plus("a+b%2Fc"), "a b/c");
        assert_eq!(unquote_plus("100%25"), "100%");
    }
}
