//! Backend registry.
//!
//! # Responsibilities
//! - Expand endpoint configuration into concrete backends (one per port)
//! - Drop disabled endpoints
//! - Preserve declaration order (used as the health/discovery order)

use std::sync::Arc;

use crate::config::EndpointConfig;
use crate::load_balancer::backend::Backend;

/// Immutable list of backends for one configuration generation.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Build the registry from configuration.
    pub fn from_config(endpoints: &[EndpointConfig]) -> Self {
        let backends = expand_endpoints(endpoints).into_iter().map(Arc::new).collect();
        Self { backends }
    }

    pub fn from_backends(backends: Vec<Arc<Backend>>) -> Self {
        Self { backends }
    }

    /// All backends in registry order.
    pub fn all(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Expand enabled endpoints into backends.
///
/// An endpoint with several ports yields one backend per port named
/// `{name}-{port}`; a single-port endpoint keeps its name.
pub fn expand_endpoints(endpoints: &[EndpointConfig]) -> Vec<Backend> {
    let mut backends = Vec::new();

    for endpoint in endpoints.iter().filter(|e| e.enabled) {
        let ports = endpoint.port.ports();
        let multi = ports.len() > 1;

        for port in ports {
            let name = if multi {
                format!("{}-{}", endpoint.name, port)
            } else {
                endpoint.name.clone()
            };

            match Backend::new(name, endpoint.address.clone(), port, endpoint.health_check_path.clone()) {
                Ok(backend) => backends.push(backend),
                Err(e) => {
                    tracing::warn!(
                        endpoint = %endpoint.name,
                        address = %endpoint.address,
                        port,
                        error = %e,
                        "Invalid backend address, skipping"
                    );
                }
            }
        }
    }

    backends
}
