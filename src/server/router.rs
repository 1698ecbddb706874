//! Routing and handler collaborator interfaces.
//!
//! Route compilation lives outside this crate; the pipeline only asks a
//! [`Router`] to resolve a path into a [`Route`] and dispatches on the
//! resolved [`Handler`].
use std::collections::HashMap;
use std::sync::Arc;

use crate::common::BoxFuture;
use crate::error::HttpError;
use crate::http::MethodSet;
use crate::server::http1::Exchange;

/// Positional and named captures produced by route matching.
#[derive(Clone, Debug, Default)]
pub struct RouteArgs {
    pub args: Vec<String>,
    pub kwargs: HashMap<String, String>,
}

/// A resolved route: the handler plus its captures.
#[derive(Clone)]
pub struct Route {
    pub handler: Arc<dyn Handler>,
    pub args: RouteArgs,
}

impl Route {
    pub fn new(handler: Arc<dyn Handler>) -> Route {
        Route {
            handler,
            args: RouteArgs::default(),
        }
    }

    pub fn with_args(handler: Arc<dyn Handler>, args: RouteArgs) -> Route {
        Route { handler, args }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("args", &self.args).finish_non_exhaustive()
    }
}

/// Maps request paths to handlers.
pub trait Router: Send + Sync {
    /// Resolve `path` into a route.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when no route matches; the pipeline
    /// answers with 404.
    fn find_route(&self, path: &str) -> Result<Route, RoutingError>;
}

/// Plain functions and closures act as routers.
impl<F> Router for F
where
    F: Fn(&str) -> Result<Route, RoutingError> + Send + Sync,
{
    fn find_route(&self, path: &str) -> Result<Route, RoutingError> {
        self(path)
    }
}

/// A request handler.
///
/// The allow-set is declared statically per handler; the pipeline
/// enforces it before dispatch and renders it into the 405 `allow`
/// header. `call` drives exactly one exchange and is expected to send
/// exactly one response through the [`Exchange`].
pub trait Handler: Send + Sync {
    /// Methods this handler implements.
    fn allowed_methods(&self) -> MethodSet;

    /// Invoked for `expect: 100-continue` requests before the interim
    /// response. Returning `false` makes the pipeline answer 417 unless
    /// the handler already responded here.
    fn can_continue<'e, 'a>(&'a self, exchange: &'a mut Exchange<'e>) -> BoxFuture<'a, bool> {
        let _ = exchange;
        Box::pin(std::future::ready(true))
    }

    /// Handle one exchange.
    fn call<'e, 'a>(
        &'a self,
        exchange: &'a mut Exchange<'e>,
        args: &'a RouteArgs,
    ) -> BoxFuture<'a, Result<(), HttpError>>;
}

// ===== Error =====

/// No route matched the request path.
#[derive(Debug)]
pub struct RoutingError {
    path: String,
}

impl RoutingError {
    pub fn new(path: impl Into<String>) -> RoutingError {
        RoutingError { path: path.into() }
    }
}

impl std::error::Error for RoutingError {}
impl std::fmt::Display for RoutingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no route for path {:?}", self.path)
    }
}
