//! Protocol-level error carried between handlers and the pipeline.
use std::io;

use crate::body::BodyError;
use crate::common::BoxError;
use crate::headers::{HeaderParseError, Headers};
use crate::http::StatusCode;

/// Error raised inside an exchange.
///
/// A `Status` error is recovered into a wire response by the pipeline; a
/// `Transport` error terminates the connection without one; anything else
/// becomes a 500.
#[derive(Debug)]
pub struct HttpError {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Status {
        status: StatusCode,
        headers: Option<Headers>,
    },
    Transport(io::Error),
    Internal(BoxError),
}

impl HttpError {
    /// An error that maps to a plain status response.
    pub fn status(status: StatusCode) -> HttpError {
        HttpError {
            kind: Kind::Status {
                status,
                headers: None,
            },
        }
    }

    /// A status response with extra header fields, e.g. 405 + `allow`.
    pub fn with_headers(status: StatusCode, headers: Headers) -> HttpError {
        HttpError {
            kind: Kind::Status {
                status,
                headers: Some(headers),
            },
        }
    }

    /// An unclassified handler failure; reported as 500.
    pub fn internal(err: impl Into<BoxError>) -> HttpError {
        HttpError {
            kind: Kind::Internal(err.into()),
        }
    }

    /// The broken-transport case, not representable on the wire.
    pub fn transport(err: io::Error) -> HttpError {
        HttpError {
            kind: Kind::Transport(err),
        }
    }

    /// Returns the transport failure, if that is what this is.
    pub(crate) fn into_transport(self) -> Result<io::Error, HttpError> {
        match self.kind {
            Kind::Transport(err) => Ok(err),
            kind => Err(HttpError { kind }),
        }
    }

    /// The wire status for this error, 500 for internal failures.
    pub(crate) fn response_parts(&self) -> (StatusCode, Option<&Headers>) {
        match &self.kind {
            Kind::Status { status, headers } => (*status, headers.as_ref()),
            Kind::Transport(_) | Kind::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            Kind::Status { .. } => None,
            Kind::Transport(e) => Some(e),
            Kind::Internal(e) => Some(e.as_ref()),
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Status { status, .. } => match status.reason() {
                Some(reason) => write!(f, "{status} {reason}"),
                None => write!(f, "{status}"),
            },
            Kind::Transport(e) => write!(f, "transport error: {e}"),
            Kind::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        HttpError::transport(err)
    }
}

impl From<HeaderParseError> for HttpError {
    fn from(_: HeaderParseError) -> Self {
        HttpError::status(StatusCode::BAD_REQUEST)
    }
}

impl From<BodyError> for HttpError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Io(e) => HttpError::transport(e),
            BodyError::UnexpectedEof => {
                HttpError::transport(io::ErrorKind::UnexpectedEof.into())
            }
            BodyError::InvalidChunk(_) | BodyError::InvalidTrailer(_) => {
                HttpError::status(StatusCode::BAD_REQUEST)
            }
        }
    }
}
