//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the expanded backend names are unique
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;
use crate::load_balancer::registry::expand_endpoints;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no enabled endpoints configured")]
    NoEndpoints,

    #[error("endpoint `{0}` has an empty port list")]
    EmptyPorts(String),

    #[error("endpoint `{0}` uses port 0")]
    ZeroPort(String),

    #[error("endpoint `{0}` has an empty address")]
    EmptyAddress(String),

    #[error("duplicate backend name `{0}` after port expansion")]
    DuplicateName(String),

    #[error("health check path `{0}` must start with '/'")]
    InvalidPath(String),

    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),

    #[error("cache.ttl_multiplier must be a finite, non-negative number")]
    InvalidMultiplier,

    #[error("invalid bind address `{0}`")]
    InvalidBindAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.server.bind_address.clone()));
    }

    for endpoint in config.endpoints.iter().filter(|e| e.enabled) {
        let ports = endpoint.port.ports();
        if ports.is_empty() {
            errors.push(ValidationError::EmptyPorts(endpoint.name.clone()));
        }
        if ports.contains(&0) {
            errors.push(ValidationError::ZeroPort(endpoint.name.clone()));
        }
        if endpoint.address.trim().is_empty() {
            errors.push(ValidationError::EmptyAddress(endpoint.name.clone()));
        }
        if let Some(path) = &endpoint.health_check_path {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidPath(path.clone()));
            }
        }
    }

    let backends = expand_endpoints(&config.endpoints);
    if backends.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }
    let mut seen = HashSet::new();
    for backend in &backends {
        if !seen.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateName(backend.name.clone()));
        }
    }

    let health = &config.health_check;
    if !health.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(health.path.clone()));
    }
    if health.interval_ms == 0 {
        errors.push(ValidationError::NotPositive("health_check.interval_ms"));
    }
    if health.timeout_ms == 0 {
        errors.push(ValidationError::NotPositive("health_check.timeout_ms"));
    }
    if health.failure_threshold == 0 {
        errors.push(ValidationError::NotPositive("health_check.failure_threshold"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive("server.request_timeout_secs"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::NotPositive("server.max_body_bytes"));
    }

    if let Some(multiplier) = config.cache.ttl_multiplier {
        if !multiplier.is_finite() || multiplier < 0.0 {
            errors.push(ValidationError::InvalidMultiplier);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
