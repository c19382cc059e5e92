//! Streaming dispatcher.
//!
//! # Data Flow
//! ```text
//! raw request body
//!     → parse JSON, extract `model`            (400 on failure)
//!     → catalog lookup (least-loaded cached backend)
//!     → live scan of healthy backends on miss  (404 if nobody serves it)
//!     → acquire ConnectionGuard
//!     → POST {backend}/v1/chat/completions     (502 if unreachable)
//!     → status + headers verbatim, body relayed through relay.rs
//! ```
//!
//! # Design Decisions
//! - No timeout on the upstream exchange; completions may stream for minutes
//! - The guard travels with the response body, so every way a request can
//!   end (body done, upstream error, caller gone, handler dropped) releases
//!   the slot exactly once

pub mod relay;

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;

use crate::catalog::{fetch_models, ModelCatalog, LIVE_SCAN_TIMEOUT};
use crate::health::HealthMonitor;
use crate::load_balancer::{Backend, Completion, ConnectionTracker};
use self::relay::GuardedStream;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const ACCEPT_STREAMING: &str = "application/json, text/event-stream";

/// Request-scoped failures surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Model \"{model}\" not found on any healthy endpoint")]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },

    #[error("Bad gateway: Failed to reach endpoint")]
    BadGateway {
        backend: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("Internal server error")]
    Internal(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let body = match &self {
            DispatchError::ModelNotFound { available, .. } => json!({
                "error": self.to_string(),
                "available_models": available.join(", "),
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// The `model` a request names. Absent, null or empty is a bad request; any
/// other non-string value is looked up by its JSON text.
fn requested_model(request: &Value) -> Result<Cow<'_, str>, DispatchError> {
    match request.get("model") {
        Some(Value::String(model)) if !model.is_empty() => Ok(Cow::Borrowed(model.as_str())),
        None | Some(Value::Null) | Some(Value::String(_)) => Err(DispatchError::InvalidRequest(
            "Missing \"model\" field in request body".into(),
        )),
        Some(other) => Ok(Cow::Owned(other.to_string())),
    }
}

/// Response extension naming the backend a request was relayed to.
#[derive(Debug, Clone)]
pub struct RoutedTo(pub Arc<Backend>);

pub struct Dispatcher {
    catalog: Arc<ModelCatalog>,
    health: Arc<HealthMonitor>,
    tracker: Arc<ConnectionTracker>,
    discovery: reqwest::Client,
    upstream: Client<HttpConnector, Body>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        health: Arc<HealthMonitor>,
        tracker: Arc<ConnectionTracker>,
        discovery: reqwest::Client,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let upstream = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            catalog,
            health,
            tracker,
            discovery,
            upstream,
        }
    }

    /// Route one chat completion request and relay the backend's response.
    ///
    /// The returned response streams the upstream body; the backend's
    /// connection slot is held until that body finishes or is dropped.
    pub async fn dispatch(&self, raw_body: Bytes) -> Result<Response, DispatchError> {
        let request: Value = serde_json::from_slice(&raw_body)
            .map_err(|_| DispatchError::InvalidRequest("Invalid JSON in request body".into()))?;

        let model = requested_model(&request)?;

        let Some(backend) = self.resolve(&model).await else {
            let available = self.catalog.get_all_models(false).await.model_ids();
            tracing::warn!(model = %model, available = available.len(), "Model not found");
            return Err(DispatchError::ModelNotFound {
                model: model.to_string(),
                available,
            });
        };

        let stream = request.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let guard = self.tracker.acquire(backend.clone());
        tracing::info!(
            model = %model,
            backend = %backend.name,
            stream,
            "Proxying chat completion"
        );

        // From here on an early return drops the guard, releasing the slot.
        let upstream_request = Request::builder()
            .method(Method::POST)
            .uri(backend.url(CHAT_COMPLETIONS_PATH))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, ACCEPT_STREAMING)
            .body(Body::from(raw_body))
            .map_err(|e| DispatchError::Internal(e.to_string()))?;

        let response = match self.upstream.request(upstream_request).await {
            Ok(response) => response,
            Err(source) => {
                guard.complete(Completion::UpstreamError);
                tracing::error!(backend = %backend.name, error = %source, "Proxy request error");
                return Err(DispatchError::BadGateway {
                    backend: backend.name.clone(),
                    source,
                });
            }
        };

        let (mut parts, incoming) = response.into_parts();
        parts.extensions.insert(RoutedTo(backend.clone()));
        tracing::info!(
            backend = %backend.name,
            status = %parts.status,
            content_type = ?parts.headers.get(header::CONTENT_TYPE),
            "Received response from upstream"
        );

        let relay = GuardedStream::new(Body::new(incoming).into_data_stream(), guard);
        Ok(Response::from_parts(parts, Body::from_stream(relay)))
    }

    /// Backend for `model`: least-loaded cached backend, else the first
    /// healthy backend that reports it live.
    pub async fn resolve(&self, model: &str) -> Option<Arc<Backend>> {
        if let Some(backend) = self.catalog.endpoint_for_model(model) {
            return Some(backend);
        }
        self.live_scan(model).await
    }

    async fn live_scan(&self, model: &str) -> Option<Arc<Backend>> {
        for backend in self.health.healthy_backends() {
            match fetch_models(&self.discovery, &backend, LIVE_SCAN_TIMEOUT).await {
                Ok(models) if models.iter().any(|m| m.answers_to(model)) => {
                    tracing::debug!(model = %model, backend = %backend.name, "Model found by live scan");
                    return Some(backend);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        backend = %backend.name,
                        model = %model,
                        error = %e,
                        "Failed to check backend for model"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_model_not_found_payload() {
        let err = DispatchError::ModelNotFound {
            model: "ghost".into(),
            available: vec!["m1".into(), "m2".into()],
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "Model \"ghost\" not found on any healthy endpoint",
                "available_models": "m1, m2"
            })
        );
    }

    #[test]
    fn test_requested_model() {
        let model = |body: Value| requested_model(&body).map(Cow::into_owned);

        assert_eq!(model(json!({"model": "m1"})).unwrap(), "m1");
        assert_eq!(model(json!({"model": 5})).unwrap(), "5");
        assert_eq!(model(json!({"model": ["m1"]})).unwrap(), r#"["m1"]"#);
        for missing in [json!({}), json!({"model": null}), json!({"model": ""})] {
            assert!(matches!(model(missing), Err(DispatchError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_invalid_request_payload() {
        let response = DispatchError::InvalidRequest("Invalid JSON in request body".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "Invalid JSON in request body"}));
    }

    #[tokio::test]
    async fn test_internal_hides_detail() {
        let response = DispatchError::Internal("uri parse".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": "Internal server error"}));
    }
}
