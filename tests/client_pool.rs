//! End-to-end client tests against a live server on loopback TCP:
//! fetching, redirects, endpoint bounds and connection reuse.
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tenon::client::{Client, ClientConfig, ClientError, Connection, PoolKey};
use tenon::common::BoxFuture;
use tenon::error::HttpError;
use tenon::headers;
use tenon::http::{Method, MethodSet, Request, StatusCode};
use tenon::server::{Exchange, Route, RouteArgs, RoutingError, Server};
use tenon::stream;

// ===== Handlers =====

struct Hello;

impl tenon::server::Handler for Hello {
    fn allowed_methods(&self) -> MethodSet {
        MethodSet::of(&[Method::Get])
    }

    fn call<'e, 'a>(
        &'a self,
        exchange: &'a mut Exchange<'e>,
        _args: &'a RouteArgs,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async move {
            exchange
                .send_response(StatusCode::OK, None, Some(b"hi"))
                .await
        })
    }
}

struct Echo;

impl tenon::server::Handler for Echo {
    fn allowed_methods(&self) -> MethodSet {
        MethodSet::of(&[Method::Post])
    }

    fn call<'e, 'a>(
        &'a self,
        exchange: &'a mut Exchange<'e>,
        _args: &'a RouteArgs,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async move {
            let body = exchange.read_body().await?;
            exchange
                .send_response(StatusCode::OK, None, Some(&body))
                .await
        })
    }
}

/// 301 to the base URL; counts its hits.
struct MovedPermanently {
    base: Arc<OnceLock<String>>,
    hits: Arc<AtomicUsize>,
}

impl tenon::server::Handler for MovedPermanently {
    fn allowed_methods(&self) -> MethodSet {
        MethodSet::of(&[Method::Get])
    }

    fn call<'e, 'a>(
        &'a self,
        exchange: &'a mut Exchange<'e>,
        _args: &'a RouteArgs,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async move {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let target = self.base.get().expect("base url set").clone();
            let headers = headers! { location: target };
            exchange
                .send_response(StatusCode::MOVED_PERMANENTLY, Some(headers), None)
                .await
        })
    }
}

/// Sleeps while tracking how many handlers run at once.
struct Slow {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl tenon::server::Handler for Slow {
    fn allowed_methods(&self) -> MethodSet {
        MethodSet::of(&[Method::Get])
    }

    fn call<'e, 'a>(
        &'a self,
        exchange: &'a mut Exchange<'e>,
        _args: &'a RouteArgs,
    ) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async move {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            exchange
                .send_response(StatusCode::OK, None, Some(b"done"))
                .await
        })
    }
}

// ===== Harness =====

struct TestServer {
    server: Arc<Server>,
    base: String,
    authority: String,
    redirect_hits: Arc<AtomicUsize>,
    peak_concurrency: Arc<AtomicUsize>,
}

/// Bind a server on an ephemeral port and start serving.
async fn start_server() -> TestServer {
    let _ = env_logger::builder().is_test(true).try_init();
    let base = Arc::new(OnceLock::new());
    let redirect_hits = Arc::new(AtomicUsize::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let moved = Arc::new(MovedPermanently {
        base: Arc::clone(&base),
        hits: Arc::clone(&redirect_hits),
    });
    let slow = Arc::new(Slow {
        running,
        peak: Arc::clone(&peak),
        delay: Duration::from_millis(100),
    });

    let router = move |path: &str| match path {
        "/" => Ok(Route::new(Arc::new(Hello))),
        "/echo" => Ok(Route::new(Arc::new(Echo))),
        "/old" => Ok(Route::new(Arc::clone(&moved) as Arc<dyn tenon::server::Handler>)),
        "/slow" => Ok(Route::new(Arc::clone(&slow) as Arc<dyn tenon::server::Handler>)),
        other => Err(RoutingError::new(other)),
    };

    let server = Arc::new(Server::bind(("127.0.0.1", 0), router).await.unwrap());
    let addr = server.local_addr().unwrap();
    base.set(format!("http://{addr}/")).unwrap();

    let serve = Arc::clone(&server);
    tokio::spawn(async move { serve.serve().await });

    TestServer {
        server,
        base: format!("http://{addr}/"),
        authority: addr.to_string(),
        redirect_hits,
        peak_concurrency: peak,
    }
}

// ===== Scenarios =====

#[tokio::test]
async fn fetch_simple_get() {
    let ts = start_server().await;
    let client = Client::new();

    let response = client.fetch(&ts.base).await.unwrap();
    assert_eq!(response.status, 200u16);
    assert_eq!(response.body.as_ref(), b"hi");
    assert!(response.has_body());
    assert_eq!(response.headers.get("content-length"), Some("2"));
    assert!(
        response
            .headers
            .get("server")
            .is_some_and(|v| v.starts_with("tenon/"))
    );

    let request = response.request.as_deref().unwrap();
    assert_eq!(request.authority(), ts.authority);

    client.close();
    ts.server.close();
}

#[tokio::test]
async fn fetch_with_request_body() {
    let ts = start_server().await;
    let client = Client::new();

    let mut request = Request::new(Method::Post, &format!("{}echo", ts.base)).unwrap();
    request.body = Some(bytes::Bytes::from_static(b"ping pong"));

    let response = client.fetch_request(request).await.unwrap();
    assert_eq!(response.status, 200u16);
    assert_eq!(response.body.as_ref(), b"ping pong");

    client.close();
    ts.server.close();
}

#[tokio::test]
async fn connection_reuse_on_keep_alive() {
    let ts = start_server().await;
    let client = Client::new();
    let key = PoolKey {
        scheme: "http".to_owned(),
        authority: ts.authority.clone(),
    };

    for _ in 0..3 {
        let response = client.fetch(&ts.base).await.unwrap();
        assert_eq!(response.status, 200u16);
    }
    assert_eq!(client.pooled_connections(&key), 1);

    client.close();
    ts.server.close();
}

#[tokio::test]
async fn permanent_redirect_followed_and_recorded() {
    let ts = start_server().await;
    let client = Client::new();
    let old_url = format!("{}old", ts.base);

    let response = client.fetch(&old_url).await.unwrap();
    assert_eq!(response.status, 200u16);
    assert_eq!(response.body.as_ref(), b"hi");
    assert_eq!(ts.redirect_hits.load(Ordering::SeqCst), 1);

    // the settled request points at the redirect target
    let request = response.request.as_deref().unwrap();
    assert_eq!(request.url(), ts.base);
    assert_eq!(request.redirect_count, 1);

    // 301 was recorded: the second fetch skips /old entirely
    let response = client.fetch(&old_url).await.unwrap();
    assert_eq!(response.status, 200u16);
    assert_eq!(ts.redirect_hits.load(Ordering::SeqCst), 1);

    client.close();
    ts.server.close();
}

#[tokio::test]
async fn endpoint_bound_caps_concurrency() {
    let ts = start_server().await;
    let client = Arc::new(Client::with_config(ClientConfig {
        max_endpoint_connections: Some(2),
        ..ClientConfig::default()
    }));
    let key = PoolKey {
        scheme: "http".to_owned(),
        authority: ts.authority.clone(),
    };

    let url = format!("{}slow", ts.base);
    let mut tasks = Vec::new();
    for _ in 0..6 {
        let client = Arc::clone(&client);
        let url = url.clone();
        tasks.push(tokio::spawn(async move { client.fetch(&url).await }));
    }
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.status, 200u16);
    }

    assert!(
        ts.peak_concurrency.load(Ordering::SeqCst) <= 2,
        "more than two requests in flight"
    );
    assert!(client.pooled_connections(&key) <= 2);

    client.close();
    ts.server.close();
}

#[tokio::test]
async fn request_timeout_closes_connection() {
    let ts = start_server().await;
    let client = Client::new();

    let mut request = Request::new(Method::Get, &format!("{}slow", ts.base)).unwrap();
    request.timeout = Some(Duration::from_millis(20));

    match client.fetch_request(request).await {
        Err(ClientError::Timeout(_)) => {}
        other => panic!("expected timeout, got {other:?}"),
    }

    client.close();
    ts.server.close();
}

#[tokio::test]
async fn transport_error_closes_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (near, mut far) = tokio::io::duplex(4 * 1024);
    let (reader, writer) = stream::split(near);
    let connection = Connection::from_streams(reader, writer, "test");

    // peer reads the request, answers a truncated response, then dies
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        let _ = far.read(&mut buf).await;
        far.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc")
            .await
            .unwrap();
        drop(far);
    });

    let mut request = Request::get("http://example.org/").unwrap();
    assert!(connection.try_lock());
    match connection.fetch(&mut request, None).await {
        Err(ClientError::Connection(_)) => {}
        other => panic!("expected connection error, got {other:?}"),
    }

    // a mid-exchange failure leaves the framing indeterminate; the
    // connection must not go back into rotation
    assert!(connection.is_closing());
    assert!(!connection.is_available());
}

#[tokio::test]
async fn missing_route_is_a_plain_404_response() {
    let ts = start_server().await;
    let client = Client::new();

    let response = client.fetch(&format!("{}gone", ts.base)).await.unwrap();
    assert_eq!(response.status, 404u16);
    assert!(response.body.is_empty());

    client.close();
    ts.server.close();
}
