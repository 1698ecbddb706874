//! HTTP server: listener ownership, connection tracking, protocol
//! selection and the per-connection pipeline.

mod http1;
mod router;

pub use http1::{Exchange, Http1Pipeline};
pub use router::{Handler, Route, RouteArgs, Router, RoutingError};

use log::{error, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::stream;

/// Agent string advertised in the `server` header.
pub const DEFAULT_SERVER_AGENT: &str = concat!("tenon/", env!("CARGO_PKG_VERSION"));

/// Server tunables shared by every connection.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Value of the injected `server` header.
    pub server_agent: String,
    /// How long to wait for a request head before answering 408.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server_agent: DEFAULT_SERVER_AGENT.to_owned(),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Wire protocols the server can speak, keyed by ALPN name.
#[derive(Clone, Copy, Debug)]
enum Protocol {
    Http1,
}

fn default_protocols() -> HashMap<String, Protocol> {
    HashMap::from([("http/1.1".to_owned(), Protocol::Http1)])
}

/// Accepting server.
///
/// Owns the listening socket, creates one [`Http1Pipeline`] task per
/// accepted connection and tracks the in-flight tasks by peer address.
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    listener: TcpListener,
    router: Arc<dyn Router>,
    config: Arc<ServerConfig>,
    protocols: HashMap<String, Protocol>,
    connections: Mutex<HashMap<SocketAddr, JoinHandle<()>>>,
    shutdown: Notify,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        router: impl Router + 'static,
    ) -> io::Result<Server> {
        Server::bind_with_config(addr, router, ServerConfig::default()).await
    }

    /// Bind with explicit [`ServerConfig`].
    pub async fn bind_with_config(
        addr: impl ToSocketAddrs,
        router: impl Router + 'static,
        config: ServerConfig,
    ) -> io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        info!("server listening on {}", listener.local_addr()?);
        Ok(Server {
            inner: Arc::new(Inner {
                listener,
                router: Arc::new(router),
                config: Arc::new(config),
                protocols: default_protocols(),
                connections: Mutex::new(HashMap::new()),
                shutdown: Notify::new(),
            }),
        })
    }

    /// The bound address, useful with port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.listener.local_addr()
    }

    /// Number of tracked in-flight connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().expect("connections lock").len()
    }

    /// Stop accepting; in-flight pipelines keep running until their
    /// transports close.
    pub fn close(&self) {
        self.inner.shutdown.notify_one();
    }

    /// Accept connections until [`close`][Server::close] is called.
    pub async fn serve(&self) {
        loop {
            let accepted = tokio::select! {
                accepted = self.inner.listener.accept() => accepted,
                _ = self.inner.shutdown.notified() => break,
            };

            let (socket, peer) = match accepted {
                Ok(ok) => ok,
                Err(err) => {
                    warn!("failed to accept connection: {err}");
                    continue;
                }
            };

            let (reader, mut writer) = stream::split(socket);
            writer.set_peer_addr(peer);

            // without TLS there is no ALPN; default to HTTP/1.1
            let protocol = match writer.selected_protocol() {
                Some(name) => match self.inner.protocols.get(name) {
                    Some(protocol) => *protocol,
                    None => {
                        error!("{peer} negotiated unsupported protocol {name:?}");
                        continue;
                    }
                },
                None => Protocol::Http1,
            };

            // the pipeline task deregisters itself; hold it at the gate
            // until its handle is in the map
            let (registered_tx, registered_rx) = tokio::sync::oneshot::channel::<()>();
            let inner = Arc::clone(&self.inner);
            let task = tokio::spawn(async move {
                let _ = registered_rx.await;
                match protocol {
                    Protocol::Http1 => {
                        Http1Pipeline::new(
                            reader,
                            writer,
                            Arc::clone(&inner.router),
                            Arc::clone(&inner.config),
                        )
                        .run()
                        .await;
                    }
                }
                inner.connections.lock().expect("connections lock").remove(&peer);
            });

            self.inner
                .connections
                .lock()
                .expect("connections lock")
                .insert(peer, task);
            let _ = registered_tx.send(());
        }
        info!("server stopped accepting");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.inner.listener.local_addr().ok())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}
