//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single inference backend (one serving process)
//! - Build outbound URLs for health checks, model discovery and chat relay
//!
//! A backend is an immutable descriptor. Mutable per-backend state (health,
//! in-flight connections) is owned by the health monitor and the connection
//! tracker and keyed by [`Backend::name`].

use serde::Serialize;
use url::Url;

/// A single inference backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backend {
    /// Unique name, `{name}-{port}` for multi-port endpoints.
    pub name: String,
    /// Host name or IP address.
    pub address: String,
    /// TCP port.
    pub port: u16,
    /// Per-backend health check path override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_path: Option<String>,
    /// Pre-parsed base URL (`http://address:port/`).
    #[serde(skip)]
    pub base_url: Url,
}

impl Backend {
    /// Create a new backend descriptor.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        health_check_path: Option<String>,
    ) -> Result<Self, url::ParseError> {
        let address = address.into();
        let base_url = Url::parse(&format!("http://{}:{}", address, port))?;
        Ok(Self {
            name: name.into(),
            address,
            port,
            health_check_path,
            base_url,
        })
    }

    /// Absolute URL for `path` on this backend.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Health check path, falling back to the global default.
    pub fn health_path<'a>(&'a self, default: &'a str) -> &'a str {
        self.health_check_path.as_deref().unwrap_or(default)
    }
}
