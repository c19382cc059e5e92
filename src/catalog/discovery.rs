//! Model discovery against a single backend.

use reqwest::Client;
use std::time::Duration;

use crate::catalog::model::{Model, ModelsResponse};
use crate::load_balancer::Backend;

/// Timeout for a catalog refresh query.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a query made while scanning for an uncached model.
pub const LIVE_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("model list request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// `GET /v1/models` on `backend`. Entries without an identifier are skipped.
pub async fn fetch_models(
    client: &Client,
    backend: &Backend,
    timeout: Duration,
) -> Result<Vec<Model>, DiscoveryError> {
    let response: ModelsResponse = client
        .get(backend.url("/v1/models"))
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response
        .data
        .into_iter()
        .filter_map(Model::from_value)
        .collect())
}
