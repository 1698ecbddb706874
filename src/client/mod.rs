//! Connection-pooled HTTP client.
//!
//! One [`Client`] holds per-endpoint pools of reusable [`Connection`]s,
//! bounds in-flight requests per endpoint with a semaphore, follows
//! redirects, and runs a background reaper that closes idle connections.

mod error;
mod http1;

pub use error::ClientError;
pub use http1::Connection;

use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::http::{Method, Request, Response};
use crate::server::DEFAULT_SERVER_AGENT;

/// How often the reaper wakes up.
const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Identifies one endpoint pool bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub authority: String,
}

impl PoolKey {
    fn of(request: &Request) -> PoolKey {
        PoolKey {
            scheme: request.scheme().to_owned(),
            authority: request.authority().to_owned(),
        }
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Client tunables.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Bound on semaphore wait plus connection opening; `None` disables.
    pub connection_timeout: Option<Duration>,
    /// Idle age after which the reaper closes a connection.
    pub keep_alive_timeout: Duration,
    /// In-flight bound per endpoint; `None` means unbounded.
    pub max_endpoint_connections: Option<usize>,
    /// How many redirects one request may follow.
    pub max_redirections: u32,
    /// Value of the injected `user-agent` header.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connection_timeout: Some(Duration::from_secs(30)),
            keep_alive_timeout: Duration::from_secs(60),
            max_endpoint_connections: None,
            max_redirections: 5,
            user_agent: DEFAULT_SERVER_AGENT.to_owned(),
        }
    }
}

struct Pool {
    connections: Vec<Arc<Connection>>,
    semaphore: Option<Arc<Semaphore>>,
}

/// Pooled HTTP client manager.
pub struct Client {
    inner: Arc<Inner>,
    reaper: JoinHandle<()>,
}

struct Inner {
    config: ClientConfig,
    pools: Mutex<HashMap<PoolKey, Pool>>,
    permanent_redirects: Mutex<HashMap<String, String>>,
}

impl Client {
    /// Client with default configuration.
    pub fn new() -> Client {
        Client::with_config(ClientConfig::default())
    }

    /// Client with explicit [`ClientConfig`].
    pub fn with_config(config: ClientConfig) -> Client {
        let inner = Arc::new(Inner {
            config,
            pools: Mutex::new(HashMap::new()),
            permanent_redirects: Mutex::new(HashMap::new()),
        });
        let reaper = tokio::spawn(reap_loop(Arc::downgrade(&inner)));
        Client { inner, reaper }
    }

    /// Default port for a scheme.
    pub fn default_port(scheme: &str) -> Option<u16> {
        match scheme {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        }
    }

    /// `GET` the URL and return the response.
    ///
    /// # Errors
    ///
    /// [`ClientError::Timeout`] when connecting or the request deadline
    /// runs out, [`ClientError::Connection`] on transport failures.
    pub async fn fetch(&self, url: &str) -> Result<Response, ClientError> {
        self.fetch_request(Request::new(Method::Get, url)?).await
    }

    /// Send a prepared request, following redirects.
    ///
    /// The settled request is attached to the returned response.
    pub async fn fetch_request(&self, mut request: Request) -> Result<Response, ClientError> {
        loop {
            self.apply_permanent_redirect(&mut request)?;

            let response = self.fetch_once(&mut request).await?;

            if let Some(location) = self.redirect_target(&request, &response) {
                info!("redirected to {location}");
                if matches!(response.status.as_u16(), 301 | 308) {
                    self.inner
                        .permanent_redirects
                        .lock()
                        .expect("redirects lock")
                        .insert(request.url().to_owned(), location.clone());
                }
                request.set_url(&location)?;
                request.redirect_count += 1;
                continue;
            }

            let mut response = response;
            response.request = Some(Box::new(request));
            return Ok(response);
        }
    }

    /// Close all connections and stop the reaper.
    pub fn close(&self) {
        self.reaper.abort();
        let pools = std::mem::take(&mut *self.inner.pools.lock().expect("pools lock"));
        for pool in pools.into_values() {
            for connection in pool.connections {
                if !connection.is_closing() {
                    connection.close();
                }
            }
        }
    }

    /// Number of pooled connections for an endpoint, for introspection.
    pub fn pooled_connections(&self, key: &PoolKey) -> usize {
        self.inner
            .pools
            .lock()
            .expect("pools lock")
            .get(key)
            .map_or(0, |pool| pool.connections.len())
    }

    async fn fetch_once(&self, request: &mut Request) -> Result<Response, ClientError> {
        let key = PoolKey::of(request);

        let (connection, permit) = match self.inner.config.connection_timeout {
            Some(bound) => tokio::time::timeout(bound, self.connect(&key))
                .await
                .map_err(|_| ClientError::Timeout(format!("connection to {key}")))??,
            None => self.connect(&key).await?,
        };

        let result = connection.fetch(request, permit).await;
        if result.is_ok() {
            connection.touch();
        }
        result
    }

    /// Acquire the endpoint permit and an available connection, opening
    /// one when none can be reused.
    async fn connect(
        &self,
        key: &PoolKey,
    ) -> Result<(Arc<Connection>, Option<OwnedSemaphorePermit>), ClientError> {
        let semaphore = {
            let mut pools = self.inner.pools.lock().expect("pools lock");
            let pool = pools.entry(key.clone()).or_insert_with(|| Pool {
                connections: Vec::new(),
                semaphore: self
                    .inner
                    .config
                    .max_endpoint_connections
                    .map(|n| Arc::new(Semaphore::new(n))),
            });
            pool.semaphore.clone()
        };

        let permit = match semaphore {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .expect("endpoint semaphore is never closed"),
            ),
            None => None,
        };

        // selection and locking happen under the pool lock; the flag
        // claim is atomic against racing fetches
        let reusable = {
            let pools = self.inner.pools.lock().expect("pools lock");
            pools.get(key).and_then(|pool| {
                let mut available: Vec<_> = pool
                    .connections
                    .iter()
                    .filter(|c| c.is_available())
                    .collect();
                available.sort_by_key(|c| c.last_activity());
                available
                    .into_iter()
                    .find(|c| c.try_lock())
                    .cloned()
            })
        };

        let connection = match reusable {
            Some(connection) => {
                debug!("reusing connection to {key}");
                connection
            }
            None => {
                // open failure drops the permit, releasing the slot
                let connection = Arc::new(
                    Connection::open(&key.scheme, &key.authority, &self.inner.config.user_agent)
                        .await?,
                );
                let claimed = connection.try_lock();
                debug_assert!(claimed);

                let mut pools = self.inner.pools.lock().expect("pools lock");
                pools
                    .entry(key.clone())
                    .or_insert_with(|| Pool {
                        connections: Vec::new(),
                        semaphore: self
                            .inner
                            .config
                            .max_endpoint_connections
                            .map(|n| Arc::new(Semaphore::new(n))),
                    })
                    .connections
                    .push(Arc::clone(&connection));
                connection
            }
        };

        connection.touch();
        Ok((connection, permit))
    }

    fn apply_permanent_redirect(&self, request: &mut Request) -> Result<(), ClientError> {
        let target = self
            .inner
            .permanent_redirects
            .lock()
            .expect("redirects lock")
            .get(request.url())
            .cloned();
        if let Some(target) = target {
            debug!("known permanent redirect {} -> {target}", request.url());
            request.set_url(&target)?;
        }
        Ok(())
    }

    /// The redirect location to follow, if any.
    fn redirect_target(&self, request: &Request, response: &Response) -> Option<String> {
        if !matches!(response.status.as_u16(), 301 | 302 | 307 | 308) {
            return None;
        }
        if request.redirect_count >= self.inner.config.max_redirections {
            return None;
        }
        response.headers.get("location").map(str::to_owned)
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ===== Reaper =====

/// Close idle connections, drop closing ones and empty buckets.
async fn reap_loop(inner: Weak<Inner>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick fires immediately; skip it
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        reap(&inner);
    }
}

fn reap(inner: &Inner) {
    let keep_alive_timeout = inner.config.keep_alive_timeout;
    let mut pools = inner.pools.lock().expect("pools lock");

    pools.retain(|key, pool| {
        for connection in &pool.connections {
            if connection.is_available()
                && connection.last_activity().elapsed() > keep_alive_timeout
            {
                debug!("reaping idle connection to {key}");
                connection.close();
            }
        }
        pool.connections.retain(|c| !c.is_closing());

        if pool.connections.is_empty() {
            debug!("removing empty endpoint pool {key}");
            false
        } else {
            true
        }
    });
}

// ===== Test =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(Client::default_port("http"), Some(80));
        assert_eq!(Client::default_port("https"), Some(443));
        assert_eq!(Client::default_port("gopher"), None);
    }

    #[tokio::test]
    async fn test_reap_removes_closing_and_empty_buckets() {
        let client = Client::new();
        let key = PoolKey {
            scheme: "http".to_owned(),
            authority: "example.org".to_owned(),
        };

        let (a, b) = tokio::io::duplex(64);
        let (reader, writer) = crate::stream::split(a);
        drop(b);
        let connection = Arc::new(Connection::from_streams(reader, writer, "test"));

        client
            .inner
            .pools
            .lock()
            .unwrap()
            .insert(
                key.clone(),
                Pool {
                    connections: vec![Arc::clone(&connection)],
                    semaphore: None,
                },
            );

        connection.close();
        reap(&client.inner);
        assert_eq!(client.pooled_connections(&key), 0);
        assert!(client.inner.pools.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_closes_idle_connections() {
        let client = Client::with_config(ClientConfig {
            keep_alive_timeout: Duration::from_secs(60),
            ..ClientConfig::default()
        });
        let key = PoolKey {
            scheme: "http".to_owned(),
            authority: "example.org".to_owned(),
        };

        let (a, b) = tokio::io::duplex(64);
        let (reader, writer) = crate::stream::split(a);
        let connection = Arc::new(Connection::from_streams(reader, writer, "test"));
        client.inner.pools.lock().unwrap().insert(
            key.clone(),
            Pool {
                connections: vec![Arc::clone(&connection)],
                semaphore: None,
            },
        );

        // fresh connection survives a sweep
        reap(&client.inner);
        assert_eq!(client.pooled_connections(&key), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        reap(&client.inner);
        assert!(connection.is_closing());
        assert_eq!(client.pooled_connections(&key), 0);
        drop(b);
    }
}
