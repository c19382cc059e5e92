//! Least Connections load balancing strategy.

use std::sync::Arc;
use crate::load_balancer::backend::Backend;

/// Selects the backend with the minimum number of in-flight requests.
///
/// `load` reports the current count for a backend. Ties go to the earliest
/// backend in `backends`, so discovery order decides between equally loaded
/// candidates.
pub fn select_least_loaded<F>(backends: &[Arc<Backend>], load: F) -> Option<Arc<Backend>>
where
    F: Fn(&Backend) -> usize,
{
    // `min_by_key` returns the first minimum, which gives the stable tie-break.
    backends.iter().min_by_key(|b| load(b)).cloned()
}
