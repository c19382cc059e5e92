//! In-flight request accounting.
//!
//! # Responsibilities
//! - Track active requests per backend (for least-loaded selection)
//! - Hand out per-request guards that release their slot exactly once
//!
//! # Design Decisions
//! - Counters are atomics in a concurrent map; no global lock on the hot path
//! - Decrement saturates at zero
//! - A guard completes at most once no matter how many termination paths
//!   race to complete it; dropping an incomplete guard completes it

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::least_conn::select_least_loaded;
use crate::observability::metrics;

/// Live per-backend request counters.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    counters: DashMap<String, AtomicUsize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for a backend (0 if never seen).
    pub fn count(&self, backend: &str) -> usize {
        self.counters
            .get(backend)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn increment(&self, backend: &str) -> usize {
        let count = self
            .counters
            .entry(backend.to_string())
            .or_default()
            .fetch_add(1, Ordering::AcqRel)
            + 1;
        tracing::debug!(backend = %backend, count, "Incremented connection count");
        metrics::record_active_connections(backend, count);
        count
    }

    /// Decrement a counter. A decrement at zero is a no-op.
    pub fn decrement(&self, backend: &str) -> usize {
        let Some(counter) = self.counters.get(backend) else {
            return 0;
        };
        match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1)) {
            Ok(prev) => {
                let count = prev - 1;
                tracing::debug!(backend = %backend, count, "Decremented connection count");
                metrics::record_active_connections(backend, count);
                count
            }
            Err(_) => {
                tracing::debug!(backend = %backend, "Connection count already zero");
                0
            }
        }
    }

    /// Backend with the fewest in-flight requests; ties go to the earliest.
    pub fn select_least_loaded(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        select_least_loaded(backends, |b| self.count(&b.name))
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect()
    }

    /// Charge one request to `backend` and return its completion guard.
    pub fn acquire(self: &Arc<Self>, backend: Arc<Backend>) -> ConnectionGuard {
        self.increment(&backend.name);
        ConnectionGuard {
            tracker: Arc::clone(self),
            backend,
            completed: AtomicBool::new(false),
        }
    }
}

/// Why a request released its connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Upstream body fully relayed.
    UpstreamEnd,
    /// Upstream request or body failed.
    UpstreamError,
    /// Guard dropped before any other completion (caller went away or the
    /// request was abandoned).
    Dropped,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Completion::UpstreamEnd => "upstream_end",
            Completion::UpstreamError => "upstream_error",
            Completion::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// One request's claim on a backend connection slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    backend: Arc<Backend>,
    completed: AtomicBool,
}

impl ConnectionGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Release the slot. Returns false if the guard had already completed.
    pub fn complete(&self, reason: Completion) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let remaining = self.tracker.decrement(&self.backend.name);
        tracing::debug!(
            backend = %self.backend.name,
            reason = %reason,
            remaining,
            "Request completed"
        );
        true
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.complete(Completion::Dropped);
    }
}
