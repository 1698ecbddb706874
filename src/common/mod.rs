//! Shared aliases.
use std::future::Future;
use std::pin::Pin;

/// Boxed error, the catch-all for handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Owned, type-erased future used at dyn-dispatch seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
