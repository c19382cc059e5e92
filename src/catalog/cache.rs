//! Cached model catalog.
//!
//! # Responsibilities
//! - Aggregate model lists from every healthy backend
//! - Deduplicate by model id, remembering every backend serving each model
//! - Serve the merged view from cache until the TTL expires
//! - Resolve a model to its least-loaded backend

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::catalog::discovery::{fetch_models, DISCOVERY_TIMEOUT};
use crate::catalog::model::{Model, ModelList};
use crate::config::CacheConfig;
use crate::health::HealthMonitor;
use crate::load_balancer::{Backend, ConnectionTracker};
use crate::observability::metrics;

/// One immutable generation of the catalog.
#[derive(Debug)]
pub struct CatalogSnapshot {
    /// Unique models, in discovery order.
    pub models: Vec<Model>,
    /// Model id → backends serving it, in discovery order.
    pub model_to_backends: HashMap<String, Vec<Arc<Backend>>>,
    /// Monotonic build time, used for TTL checks.
    pub fetched_at: Instant,
    pub fetched_at_utc: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Merge per-backend model lists. `results` must be in healthy-list order;
    /// the first backend to report an id supplies its canonical record.
    pub fn build(results: Vec<(Arc<Backend>, Vec<Model>)>) -> Self {
        let mut models: Vec<Model> = Vec::new();
        let mut model_to_backends: HashMap<String, Vec<Arc<Backend>>> = HashMap::new();

        for (backend, reported) in results {
            for model in reported {
                match model_to_backends.get_mut(model.id()) {
                    Some(backends) => {
                        if !backends.iter().any(|b| b.name == backend.name) {
                            backends.push(backend.clone());
                        }
                    }
                    None => {
                        model_to_backends.insert(model.id().to_string(), vec![backend.clone()]);
                        models.push(model);
                    }
                }
            }
        }

        Self {
            models,
            model_to_backends,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        }
    }

    pub fn backends_for(&self, model: &str) -> Option<&[Arc<Backend>]> {
        self.model_to_backends
            .get(model)
            .map(Vec::as_slice)
            .filter(|b| !b.is_empty())
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.iter().map(|m| m.id().to_string()).collect()
    }

    pub fn to_list(&self) -> ModelList {
        ModelList::new(self.models.clone())
    }
}

pub struct ModelCatalog {
    health: Arc<HealthMonitor>,
    tracker: Arc<ConnectionTracker>,
    client: reqwest::Client,
    config: CacheConfig,
    cache: ArcSwapOption<CatalogSnapshot>,
    refresh_lock: Mutex<()>,
    /// Bumped by `clear_cache`. A refresh only publishes if it is unchanged.
    generation: AtomicU64,
}

impl ModelCatalog {
    pub fn new(
        health: Arc<HealthMonitor>,
        tracker: Arc<ConnectionTracker>,
        client: reqwest::Client,
        config: CacheConfig,
    ) -> Self {
        Self {
            health,
            tracker,
            client,
            config,
            cache: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Effective cache lifetime, derived from the current tunables.
    pub fn ttl(&self) -> Duration {
        self.config.effective_ttl(self.health.config().interval_ms)
    }

    /// Cached entry, whatever its age.
    pub fn cached(&self) -> Option<Arc<CatalogSnapshot>> {
        self.cache.load_full()
    }

    fn fresh(&self) -> Option<Arc<CatalogSnapshot>> {
        self.cache
            .load_full()
            .filter(|s| s.fetched_at.elapsed() < self.ttl())
    }

    /// Merged model view. Served from cache while it is younger than the TTL
    /// unless `force_refresh` is set.
    pub async fn get_all_models(&self, force_refresh: bool) -> Arc<CatalogSnapshot> {
        if !force_refresh {
            if let Some(snapshot) = self.fresh() {
                tracing::debug!(models = snapshot.models.len(), "Returning cached models");
                return snapshot;
            }
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if !force_refresh {
            if let Some(snapshot) = self.fresh() {
                return snapshot;
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let snapshot = Arc::new(self.refresh().await);
        self.publish(generation, &snapshot);
        snapshot
    }

    /// Store `snapshot` unless the cache was cleared after `generation` was read.
    fn publish(&self, generation: u64, snapshot: &Arc<CatalogSnapshot>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Catalog cleared during refresh, result not cached");
            return;
        }
        let published = Some(snapshot.clone());
        self.cache.store(published.clone());
        if self.generation.load(Ordering::SeqCst) != generation {
            // Cleared between the check and the store
            let _ = self.cache.compare_and_swap(&published, None);
        }
    }

    async fn refresh(&self) -> CatalogSnapshot {
        let healthy = self.health.healthy_backends();
        tracing::debug!(backends = healthy.len(), "Fetching models from healthy backends");

        let lists = join_all(healthy.iter().map(|backend| async move {
            match fetch_models(&self.client, backend, DISCOVERY_TIMEOUT).await {
                Ok(models) => models,
                Err(e) => {
                    tracing::error!(backend = %backend.name, error = %e, "Failed to fetch models");
                    Vec::new()
                }
            }
        }))
        .await;

        let snapshot = CatalogSnapshot::build(healthy.into_iter().zip(lists).collect());
        tracing::info!(models = snapshot.models.len(), "Model catalog refreshed");
        metrics::record_catalog_refresh(snapshot.models.len());
        snapshot
    }

    /// Drop the cached entry; the next lookup refetches.
    pub fn clear_cache(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.store(None);
        tracing::info!("Model cache cleared");
    }

    /// Least-loaded cached backend for `model`. Never touches the network.
    pub fn endpoint_for_model(&self, model: &str) -> Option<Arc<Backend>> {
        let snapshot = self.cache.load_full()?;
        let backends = snapshot.backends_for(model)?;
        let selected = self.tracker.select_least_loaded(backends)?;

        tracing::debug!(
            model = %model,
            backend = %selected.name,
            candidates = backends.len(),
            active_connections = self.tracker.count(&selected.name),
            "Model resolved from cache"
        );
        Some(selected)
    }
}
