//! HTTP server component built on axum.
//!
//! The server keeps serving after the entry routine observes cancellation so
//! that in-flight requests can finish; it only stops accepting once its own
//! teardown runs.
//!
//! Every route, health routes included, runs behind request tracing, a
//! per-request timeout (408) and panic recovery (500).

use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::lifecycle::Component;

pub const DEFAULT_HTTP_TEARDOWN_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct HealthState {
    ready: Arc<AtomicBool>,
    started: Instant,
}

pub struct HttpServerComponent {
    address: SocketAddr,
    router: Mutex<Option<Router>>,
    ready: Arc<AtomicBool>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    stop: CancellationToken,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    request_timeout: Duration,
    teardown_deadline: Duration,
}

impl HttpServerComponent {
    /// `router` carries the application routes; health routes are merged in.
    pub fn new(address: SocketAddr, router: Router) -> Self {
        Self {
            address,
            router: Mutex::new(Some(router)),
            ready: Arc::new(AtomicBool::new(false)),
            local_addr: std::sync::Mutex::new(None),
            stop: CancellationToken::new(),
            server: Mutex::new(None),
            request_timeout: DEFAULT_HTTP_REQUEST_TIMEOUT,
            teardown_deadline: DEFAULT_HTTP_TEARDOWN_DEADLINE,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_teardown_deadline(mut self, deadline: Duration) -> Self {
        self.teardown_deadline = deadline;
        self
    }

    /// Bound address once `run` has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    fn health_routes(&self) -> Router {
        let state = HealthState {
            ready: self.ready.clone(),
            started: Instant::now(),
        };

        Router::new()
            .route("/healthz", get(|| async { StatusCode::OK }))
            .route("/readyz", get(readiness))
            .route("/health", get(health))
            .with_state(state)
    }

    fn with_middleware(&self, router: Router) -> Router {
        router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.request_timeout,
            ))
            .layer(CatchPanicLayer::custom(recover_panic))
            .layer(TraceLayer::new_for_http())
    }
}

fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = message, "HTTP handler panicked");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn readiness(State(state): State<HealthState>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn health(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let status = if state.ready.load(Ordering::Relaxed) {
        "ready"
    } else {
        "draining"
    };
    Json(json!({
        "state": status,
        "uptime_secs": state.started.elapsed().as_secs(),
    }))
}

#[async_trait]
impl Component for HttpServerComponent {
    fn name(&self) -> &'static str {
        "http_server"
    }

    fn teardown_deadline(&self) -> Option<Duration> {
        Some(self.teardown_deadline)
    }

    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let router = self
            .router
            .lock()
            .await
            .take()
            .context("http server already started")?;

        let listener = TcpListener::bind(self.address)
            .await
            .with_context(|| format!("HTTP server listen error on {}", self.address))?;
        let local_addr = listener.local_addr()?;
        if let Ok(mut slot) = self.local_addr.lock() {
            *slot = Some(local_addr);
        }

        let app = self.with_middleware(router.merge(self.health_routes()));
        let stop = self.stop.clone();
        let mut handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });

        self.ready.store(true, Ordering::Relaxed);
        tracing::info!(address = %local_addr, "HTTP server listening");

        tokio::select! {
            res = &mut handle => {
                self.ready.store(false, Ordering::Relaxed);
                match res {
                    Ok(Ok(())) => Err(anyhow::anyhow!("HTTP server exited unexpectedly")),
                    Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP server error")),
                    Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("HTTP server context cancelled, waiting for teardown");
                *self.server.lock().await = Some(handle);
                Ok(())
            }
        }
    }

    async fn teardown(&self, deadline: Duration) -> anyhow::Result<()> {
        self.ready.store(false, Ordering::Relaxed);
        self.stop.cancel();

        let Some(handle) = self.server.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!("HTTP server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(anyhow::Error::new(e).context("HTTP server shutdown error")),
            Ok(Err(e)) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
            Err(_) => Err(anyhow::anyhow!("HTTP server shutdown timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get_status(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response.lines().next().unwrap_or_default().to_string()
    }

    async fn wait_for_addr(server: &HttpServerComponent) -> SocketAddr {
        for _ in 0..200 {
            if let Some(addr) = server.local_addr() {
                return addr;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("server never bound");
    }

    #[tokio::test]
    async fn test_serves_health_and_app_routes_until_teardown() {
        let router = Router::new().route("/hello", get(|| async { "hi" }));
        let server = Arc::new(HttpServerComponent::new(
            "127.0.0.1:0".parse().unwrap(),
            router,
        ));
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let server = server.clone();
            let cancel = cancel.clone();
            async move { server.run(cancel).await }
        });

        let addr = wait_for_addr(&server).await;
        assert!(get_status(addr, "/healthz").await.contains("200"));
        assert!(get_status(addr, "/readyz").await.contains("200"));
        assert!(get_status(addr, "/hello").await.contains("200"));

        cancel.cancel();
        run.await.unwrap().unwrap();

        // Still serving between cancellation and teardown.
        assert!(get_status(addr, "/healthz").await.contains("200"));

        server.teardown(Duration::from_secs(5)).await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_panicking_handler_returns_500_and_server_keeps_serving() {
        async fn explode() -> &'static str {
            panic!("handler exploded")
        }

        let router = Router::new().route("/boom", get(explode));
        let server = Arc::new(HttpServerComponent::new(
            "127.0.0.1:0".parse().unwrap(),
            router,
        ));
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let server = server.clone();
            let cancel = cancel.clone();
            async move { server.run(cancel).await }
        });

        let addr = wait_for_addr(&server).await;
        assert!(get_status(addr, "/boom").await.contains("500"));
        assert!(get_status(addr, "/healthz").await.contains("200"));
        assert!(get_status(addr, "/boom").await.contains("500"));

        cancel.cancel();
        run.await.unwrap().unwrap();
        server.teardown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let server = Arc::new(
            HttpServerComponent::new("127.0.0.1:0".parse().unwrap(), router)
                .with_request_timeout(Duration::from_millis(100)),
        );
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let server = server.clone();
            let cancel = cancel.clone();
            async move { server.run(cancel).await }
        });

        let addr = wait_for_addr(&server).await;
        assert!(get_status(addr, "/slow").await.contains("408"));
        assert!(get_status(addr, "/healthz").await.contains("200"));

        cancel.cancel();
        run.await.unwrap().unwrap();
        server.teardown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = HttpServerComponent::new(taken.local_addr().unwrap(), Router::new());

        let err = server.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("listen error"));
    }

    #[tokio::test]
    async fn test_teardown_without_run_is_noop() {
        let server = HttpServerComponent::new("127.0.0.1:0".parse().unwrap(), Router::new());
        assert!(server.teardown(Duration::from_millis(10)).await.is_ok());
    }

    #[test]
    fn test_advertises_deadline() {
        let server = HttpServerComponent::new("127.0.0.1:0".parse().unwrap(), Router::new());
        assert_eq!(server.teardown_deadline(), Some(DEFAULT_HTTP_TEARDOWN_DEADLINE));

        let server = server.with_teardown_deadline(Duration::from_secs(3));
        assert_eq!(server.teardown_deadline(), Some(Duration::from_secs(3)));
    }
}
