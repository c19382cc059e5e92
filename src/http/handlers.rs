//! Route handlers.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::catalog::ModelList;
use crate::dispatch::{DispatchError, RoutedTo};
use crate::health::HealthStatus;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Payload of `GET /health` and `POST /health/force-check`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub endpoints: BTreeMap<String, HealthStatus>,
    pub healthy_endpoints: usize,
    pub total_endpoints: usize,
    pub active_connections: BTreeMap<String, usize>,
}

impl HealthReport {
    pub fn collect(state: &AppState) -> Self {
        let endpoints = state.health.status();
        let healthy_endpoints = endpoints.values().filter(|s| s.healthy).count();
        Self {
            status: if healthy_endpoints > 0 { "healthy" } else { "unhealthy" },
            total_endpoints: endpoints.len(),
            healthy_endpoints,
            endpoints,
            active_connections: state.tracker.stats(),
        }
    }
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let snapshot = state.catalog.get_all_models(false).await;
    tracing::info!(models = snapshot.models.len(), "Retrieved all models");
    Json(snapshot.to_list())
}

pub async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let start = Instant::now();

    match state.dispatcher.dispatch(body).await {
        Ok(response) => {
            let backend = response
                .extensions()
                .get::<RoutedTo>()
                .map(|r| r.0.name.clone())
                .unwrap_or_default();
            metrics::record_request(response.status().as_u16(), &backend, start);
            response
        }
        Err(e) => {
            let backend = match &e {
                DispatchError::BadGateway { backend, .. } => backend.as_str(),
                _ => "none",
            };
            metrics::record_request(e.status().as_u16(), backend, start);
            e.into_response()
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::collect(&state))
}

pub async fn force_check(State(state): State<AppState>) -> Json<HealthReport> {
    tracing::info!("Forced health check requested");
    state.health.check_all().await;
    state.catalog.clear_cache();
    state.catalog.get_all_models(true).await;
    Json(HealthReport::collect(&state))
}

pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    tracing::warn!(method = %method, path = %uri.path(), "Route not found");
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Converts a handler panic into a 500. Any connection slot held by the
/// panicking request is released when its guard unwinds.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(error = %detail, "Unhandled error");

    DispatchError::Internal(detail.to_string()).into_response()
}
