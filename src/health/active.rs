//! Active health checking.
//!
//! # Responsibilities
//! - Periodically check every registered backend
//! - Own the per-backend health status
//! - Answer "which backends are healthy right now"

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::schedule::Schedule;
use crate::health::state::{HealthStatus, Transition};
use crate::load_balancer::{Backend, BackendRegistry};
use crate::observability::metrics;

/// Why a single check failed.
#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error("invalid check request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("connection error: {0}")]
    Connection(#[from] hyper_util::client::legacy::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("non-success status {0}")]
    Status(StatusCode),
}

pub struct HealthMonitor {
    registry: ArcSwap<BackendRegistry>,
    statuses: DashMap<String, HealthStatus>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
    task: Mutex<Option<JoinHandle<()>>>,
    cycles: AtomicU64,
}

impl HealthMonitor {
    pub fn new(registry: BackendRegistry, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .build(HttpConnector::new());

        let statuses = DashMap::new();
        for backend in registry.all() {
            statuses.insert(backend.name.clone(), HealthStatus::default());
        }

        Self {
            registry: ArcSwap::from_pointee(registry),
            statuses,
            config,
            client,
            task: Mutex::new(None),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Current registry generation.
    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.registry.load_full()
    }

    /// Number of completed check cycles.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Run one check cycle now, then one per tick of `schedule` until
    /// [`stop`](Self::stop). Calling `start` on a running monitor is a no-op.
    pub fn start<S: Schedule>(self: &Arc<Self>, mut schedule: S) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("Health monitor already running");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval_ms,
            path = %self.config.path,
            backends = self.registry.load().len(),
            "Health monitor starting"
        );

        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            monitor.check_all().await;
            while schedule.tick().await {
                monitor.check_all().await;
            }
            tracing::debug!("Health check schedule exhausted");
        }));
    }

    /// Cancel the check schedule. Idempotent.
    pub fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = task {
            handle.abort();
            tracing::info!("Health monitor stopped");
        }
    }

    /// Check every registered backend concurrently and wait for all of them.
    pub async fn check_all(&self) {
        let registry = self.registry.load_full();
        join_all(registry.all().iter().map(|b| self.check_one(b))).await;
        self.cycles.fetch_add(1, Ordering::AcqRel);
    }

    /// Check a single backend and record the result. Returns its health after
    /// the update. A result for a backend that left the registry while the
    /// check was running is discarded and reported as unhealthy.
    pub async fn check_one(&self, backend: &Backend) -> bool {
        let result = self.send_check(backend).await;
        let now = Utc::now();

        let healthy = {
            let Some(mut status) = self.statuses.get_mut(&backend.name) else {
                tracing::debug!(backend = %backend.name, "Discarding health result for removed backend");
                return false;
            };
            match result {
                Ok(status_code) => {
                    if status.record_success(now) == Transition::BecameHealthy {
                        tracing::info!(backend = %backend.name, "Backend recovered");
                    } else {
                        tracing::debug!(backend = %backend.name, status = %status_code, "Health check passed");
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    match status.record_failure(message.clone(), self.config.failure_threshold, now) {
                        Transition::BecameUnhealthy => tracing::warn!(
                            backend = %backend.name,
                            error_count = status.consecutive_errors,
                            error = %message,
                            "Backend marked unhealthy"
                        ),
                        _ => tracing::warn!(
                            backend = %backend.name,
                            error_count = status.consecutive_errors,
                            error = %message,
                            "Health check failed"
                        ),
                    }
                }
            }
            status.healthy
        };

        metrics::record_backend_health(&backend.name, healthy);
        healthy
    }

    async fn send_check(&self, backend: &Backend) -> Result<StatusCode, HealthCheckError> {
        let uri = backend.url(backend.health_path(&self.config.path));
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("user-agent", "inference-gateway-health-check")
            .body(Body::empty())?;

        let timeout = self.config.timeout();
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(response.status()),
            Ok(Ok(response)) => Err(HealthCheckError::Status(response.status())),
            Ok(Err(e)) => Err(HealthCheckError::Connection(e)),
            Err(_) => Err(HealthCheckError::Timeout(timeout)),
        }
    }

    /// Healthy backends in registry order.
    pub fn healthy_backends(&self) -> Vec<Arc<Backend>> {
        self.registry
            .load()
            .all()
            .iter()
            .filter(|b| self.statuses.get(&b.name).map_or(true, |s| s.healthy))
            .cloned()
            .collect()
    }

    /// Snapshot of every registered backend's status.
    pub fn status(&self) -> BTreeMap<String, HealthStatus> {
        self.registry
            .load()
            .all()
            .iter()
            .map(|b| {
                let status = self
                    .statuses
                    .get(&b.name)
                    .map(|s| s.clone())
                    .unwrap_or_default();
                (b.name.clone(), status)
            })
            .collect()
    }

    /// Swap in a new registry generation. Backends that survive keep their
    /// status, new ones start healthy, removed ones are forgotten.
    pub fn reload(&self, registry: BackendRegistry) {
        self.statuses.retain(|name, _| registry.get(name).is_some());
        for backend in registry.all() {
            self.statuses.entry(backend.name.clone()).or_default();
        }
        tracing::info!(backends = registry.len(), "Backend registry reloaded");
        self.registry.store(Arc::new(registry));
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
