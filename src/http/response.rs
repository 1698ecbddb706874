use bytes::Bytes;

use crate::headers::Headers;
use crate::http::{Method, Request, StatusCode};

/// HTTP response as read by the client.
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    /// Accumulated body bytes; empty when a streaming callback consumed
    /// the body or the response has none.
    pub body: Bytes,
    /// The request that produced this response, attached by the client
    /// manager once the redirect chain settles.
    pub request: Option<Box<Request>>,
}

impl Response {
    pub(crate) fn new(status: StatusCode) -> Response {
        Response {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            request: None,
        }
    }

    /// Whether a message body is expected for this response.
    ///
    /// See [`has_body`] for the rule; the method is taken from the
    /// attached request, defaulting to `GET` when absent.
    pub fn has_body(&self) -> bool {
        let method = self
            .request
            .as_deref()
            .map(|r| r.method)
            .unwrap_or(Method::Get);
        has_body(method, self.status)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Whether a response to `method` with `status` carries a body.
///
/// `HEAD` responses, interim `1xx` responses, `204` and `304` never do.
pub fn has_body(method: Method, status: StatusCode) -> bool {
    !(method == Method::Head
        || status.is_informational()
        || status == 204
        || status == 304)
}
