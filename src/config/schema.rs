//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the inference gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Inbound server settings.
    pub server: ServerConfig,

    /// Inference backends, in routing preference order.
    pub endpoints: Vec<EndpointConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Model catalog cache settings.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Inbound server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Timeout for the non-streaming routes (models, health) in seconds.
    /// Chat completions are never timed out.
    pub request_timeout_secs: u64,

    /// Largest chat completion request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A single port or a list of ports served on the same address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSpec {
    Single(u16),
    Multiple(Vec<u16>),
}

impl PortSpec {
    /// Ports in declaration order.
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortSpec::Single(port) => vec![*port],
            PortSpec::Multiple(ports) => ports.clone(),
        }
    }
}

/// Inference backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Backend identifier. Suffixed with `-{port}` when several ports are given.
    pub name: String,

    /// Host name or IP address.
    pub address: String,

    /// Port, or ports for a host running several serving processes.
    pub port: PortSpec,

    /// Disabled endpoints are ignored entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Overrides `health_check.path` for this endpoint.
    #[serde(default)]
    pub health_check_path: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Path to check on every backend.
    pub path: String,

    /// Check interval in milliseconds.
    pub interval_ms: u64,

    /// Check timeout in milliseconds.
    pub timeout_ms: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub failure_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_ms: 30_000,
            timeout_ms: 5_000,
            failure_threshold: 3,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Model catalog cache configuration.
///
/// Either tunable may be omitted; see [`CacheConfig::effective_ttl`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Explicit TTL in milliseconds.
    pub ttl_ms: Option<u64>,

    /// TTL as a multiple of the health check interval.
    pub ttl_multiplier: Option<f64>,
}

impl CacheConfig {
    /// Resolve the catalog TTL.
    ///
    /// With neither tunable set the TTL is the health check interval. With one
    /// set, that one wins. With both set, the smaller value wins.
    pub fn effective_ttl(&self, health_interval_ms: u64) -> Duration {
        let mut candidates: Vec<(u64, String)> = Vec::with_capacity(2);

        if let Some(ttl_ms) = self.ttl_ms {
            candidates.push((ttl_ms, "ttl_ms".to_string()));
        }
        if let Some(multiplier) = self.ttl_multiplier {
            let value = (health_interval_ms as f64 * multiplier).round() as u64;
            candidates.push((
                value,
                format!("ttl_multiplier ({} x {}ms)", multiplier, health_interval_ms),
            ));
        }

        let ttl_ms = match candidates.len() {
            0 => health_interval_ms,
            1 => candidates[0].0,
            _ => {
                // Ties keep the first candidate (ttl_ms).
                let (value, source) = candidates
                    .iter()
                    .fold(&candidates[0], |min, c| if c.0 < min.0 { c } else { min });
                tracing::debug!(
                    options = ?candidates,
                    selected = %source,
                    ttl_ms = value,
                    "Multiple cache TTL options configured, using smallest"
                );
                *value
            }
        };

        Duration::from_millis(ttl_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}
