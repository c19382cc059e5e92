//! Shared utilities for the integration suites.
//!
//! Mock backends are small axum apps speaking the OpenAI-compatible subset the
//! gateway relies on. Every server binds `127.0.0.1:0`.

#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use inference_gateway::config::{EndpointConfig, GatewayConfig, PortSpec};
use inference_gateway::http::{AppState, HttpServer};
use inference_gateway::Shutdown;

/// Number of chunks a streamed completion emits.
pub const STREAM_CHUNKS: usize = 5;

/// Observable state of a mock backend.
pub struct MockState {
    pub name: String,
    models: Mutex<Vec<String>>,
    pub healthy: AtomicBool,
    /// Chat completions stream forever instead of finishing.
    pub endless: AtomicBool,
    /// Streamed completions break off with an error after two chunks.
    pub break_stream: AtomicBool,
    /// Delay before `/v1/models` answers.
    pub models_delay_ms: AtomicU64,
    /// Delay before chat completions send their headers.
    pub chat_delay_ms: AtomicU64,
    pub model_hits: AtomicUsize,
    pub health_hits: AtomicUsize,
    pub chat_hits: AtomicUsize,
    pub last_chat_body: Mutex<Option<Bytes>>,
    pub last_accept: Mutex<Option<String>>,
}

impl MockState {
    pub fn set_models(&self, ids: &[&str]) {
        *self.models.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl MockBackend {
    /// Start a backend serving `models`.
    pub async fn start(name: &str, models: &[&str]) -> Self {
        let state = Arc::new(MockState {
            name: name.to_string(),
            models: Mutex::new(models.iter().map(|s| s.to_string()).collect()),
            healthy: AtomicBool::new(true),
            endless: AtomicBool::new(false),
            break_stream: AtomicBool::new(false),
            models_delay_ms: AtomicU64::new(0),
            chat_delay_ms: AtomicU64::new(0),
            model_hits: AtomicUsize::new(0),
            health_hits: AtomicUsize::new(0),
            chat_hits: AtomicUsize::new(0),
            last_chat_body: Mutex::new(None),
            last_accept: Mutex::new(None),
        });

        let app = Router::new()
            .route("/health", get(mock_health))
            .route("/v1/models", get(mock_models))
            .route("/v1/chat/completions", post(mock_chat))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await;
        });

        Self {
            addr,
            state,
            stop: Mutex::new(Some(stop)),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and close idle ones. The port refuses
    /// from here on.
    pub async fn kill(&self) {
        if let Some(stop) = self.stop.lock().unwrap().take() {
            let _ = stop.send(());
        }
        let addr = self.addr;
        wait_until_async(Duration::from_secs(5), || async move {
            tokio::net::TcpStream::connect(addr).await.is_err()
        })
        .await;
    }
}

async fn mock_health(State(state): State<Arc<MockState>>) -> StatusCode {
    state.health_hits.fetch_add(1, Ordering::SeqCst);
    if state.healthy.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn mock_models(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.model_hits.fetch_add(1, Ordering::SeqCst);
    pause(&state.models_delay_ms).await;
    let data: Vec<Value> = state
        .models
        .lock()
        .unwrap()
        .iter()
        .map(|id| json!({ "id": id, "object": "model", "owned_by": state.name }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

async fn mock_chat(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.chat_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_accept.lock().unwrap() = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_chat_body.lock().unwrap() = Some(body.clone());

    let request: Value = serde_json::from_slice(&body).unwrap_or_default();
    let model = request["model"].as_str().unwrap_or_default().to_string();
    pause(&state.chat_delay_ms).await;

    if state.break_stream.load(Ordering::SeqCst) {
        let chunks = stream::iter(vec![
            Ok(Bytes::from("data: {\"chunk\":0}\n\n")),
            Ok(Bytes::from("data: {\"chunk\":1}\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "backend crashed")),
        ])
        .then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            chunk
        });
        return sse(Body::from_stream(chunks));
    }

    if state.endless.load(Ordering::SeqCst) {
        let chunks = stream::unfold(0usize, |n| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let line = format!("data: {{\"chunk\":{}}}\n\n", n);
            Some((Ok::<_, Infallible>(Bytes::from(line)), n + 1))
        });
        return sse(Body::from_stream(chunks));
    }

    if request["stream"].as_bool().unwrap_or(false) {
        let backend = state.name.clone();
        let chunks = stream::unfold(0usize, move |n| {
            let backend = backend.clone();
            let model = model.clone();
            async move {
                if n > STREAM_CHUNKS {
                    return None;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                let line = if n == STREAM_CHUNKS {
                    "data: [DONE]\n\n".to_string()
                } else {
                    format!(
                        "data: {}\n\n",
                        json!({ "model": model, "backend": backend, "choices": [{ "delta": { "content": n.to_string() } }] })
                    )
                };
                Some((Ok::<_, Infallible>(Bytes::from(line)), n + 1))
            }
        });
        return sse(Body::from_stream(chunks));
    }

    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": model,
        "backend": state.name,
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hello" } }]
    }))
    .into_response()
}

async fn pause(delay_ms: &AtomicU64) {
    let delay = delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

fn sse(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// Gateway config pointing at `backends`, named `b0`, `b1`, ...
///
/// The health interval is long enough that only the startup check runs.
pub fn gateway_config(backends: &[&MockBackend]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.bind_address = "127.0.0.1:0".into();
    config.health_check.interval_ms = 600_000;
    config.health_check.timeout_ms = 1_000;
    config.health_check.failure_threshold = 1;
    config.cache.ttl_ms = Some(60_000);
    config.endpoints = backends
        .iter()
        .enumerate()
        .map(|(i, b)| endpoint(&format!("b{}", i), b.port()))
        .collect();
    config
}

pub fn endpoint(name: &str, port: u16) -> EndpointConfig {
    EndpointConfig {
        name: name.to_string(),
        address: "127.0.0.1".to_string(),
        port: PortSpec::Single(port),
        enabled: true,
        health_check_path: None,
    }
}

/// A running gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub config_updates: mpsc::UnboundedSender<GatewayConfig>,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(config).unwrap();
        let state = server.state().clone();
        let (config_updates, rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();

        let run = server.run(listener, rx, shutdown.clone());
        let handle = tokio::spawn(async move {
            run.await.unwrap();
        });

        // Startup check completes before tests look at health.
        wait_until(Duration::from_secs(5), || state.health.cycles_completed() > 0).await;

        Self {
            addr,
            state,
            config_updates,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `condition` every 10ms until it holds; panics after `limit`.
pub async fn wait_until<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Like [`wait_until`] for async conditions.
pub async fn wait_until_async<F, Fut>(limit: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
