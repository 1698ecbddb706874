//! # Asynchronous HTTP/1.1 Server and Client Toolkit
//!
//! This library provides an HTTP/1.1 stack over tokio: a server built
//! around a per-connection protocol pipeline, a connection-pooled client,
//! and an HPACK header-compression codec.
//!
//! # Library Design
//!
//! Components are usable on their own and composed by the integration
//! layers.
//!
//! ## Definitions
//!
//! - [`headers`] HTTP header fields ([RFC7230 Section 3.2])
//! - [`http`] HTTP semantics: methods, statuses, messages
//! - [`body`] lazy message-body readers
//! - [`stream`] the buffered transport seam
//!
//! ## Behaviors
//!
//! - [`server`] listener, routing and the HTTP/1.1 pipeline
//! - [`client`] pooled connections, redirects, idle reaping
//! - [`hpack`] HPACK header compression ([RFC7541])
//!
//! # Usage
//!
//! The server side routes requests to [`server::Handler`]s resolved by a
//! [`server::Router`]; the client side goes through [`client::Client`].
//!
//! [RFC7230 Section 3.2]: <https://www.rfc-editor.org/rfc/rfc7230.html#section-3.2>
//! [RFC7541]: <https://www.rfc-editor.org/rfc/rfc7541.html>
#![warn(missing_debug_implementations)]

mod matches;
pub mod common;

// definitions
pub mod headers;
pub mod http;
pub mod body;
pub mod stream;
pub mod error;

// HTTP protocol
pub mod server;
pub mod client;
pub mod hpack;

pub use error::HttpError;
