use std::io;

use crate::http::InvalidUrl;

/// Client-side fetch failure.
#[derive(Debug)]
pub enum ClientError {
    /// Connection establishment or the whole fetch ran out of time.
    Timeout(String),
    /// The transport failed or could not be opened.
    Connection(io::Error),
    /// The peer answered with something that is not HTTP/1.x.
    Protocol(String),
    /// Request URL (or redirect location) rejected.
    Url(InvalidUrl),
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connection(e) => Some(e),
            ClientError::Url(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Timeout(what) => write!(f, "{what} timed out"),
            ClientError::Connection(e) => write!(f, "connection error: {e}"),
            ClientError::Protocol(what) => write!(f, "protocol error: {what}"),
            ClientError::Url(e) => std::fmt::Display::fmt(e, f),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Connection(err)
    }
}

impl From<InvalidUrl> for ClientError {
    fn from(err: InvalidUrl) -> Self {
        ClientError::Url(err)
    }
}

impl From<crate::body::BodyError> for ClientError {
    fn from(err: crate::body::BodyError) -> Self {
        use crate::body::BodyError;
        match err {
            BodyError::Io(e) => ClientError::Connection(e),
            BodyError::UnexpectedEof => {
                ClientError::Connection(io::ErrorKind::UnexpectedEof.into())
            }
            other => ClientError::Protocol(other.to_string()),
        }
    }
}
