//! HTTP semantics: methods, status codes, versions, request and response
//! messages.

mod method;
mod request;
mod response;
mod status;
mod version;

pub use method::{Method, MethodSet};
pub use request::{BodyCallback, BodyProducer, InvalidUrl, QueryMap, Request};
pub use response::{Response, has_body};
pub use status::{InvalidStatus, StatusCode};
pub use version::Version;

pub(crate) use request::{parse_query_strict, unquote_plus};
