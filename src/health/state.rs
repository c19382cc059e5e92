//! Backend health state machine.
//!
//! # States
//! - Healthy: backend receives traffic (initial state, before any check)
//! - Unhealthy: backend excluded from discovery and routing
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures >= failure_threshold
//! Unhealthy → Healthy: a single successful check
//! ```
//!
//! # Design Decisions
//! - Degradation needs a run of failures, recovery needs one success
//! - Failure detail is kept on every failed check and cleared on success

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health of one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    /// Time of the last completed check.
    pub last_check: Option<DateTime<Utc>>,
    /// Consecutive failed checks since the last success.
    #[serde(rename = "errorCount")]
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            last_check: None,
            consecutive_errors: 0,
            last_error: None,
        }
    }
}

/// State change caused by a check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    BecameHealthy,
    BecameUnhealthy,
}

impl HealthStatus {
    /// Apply a successful check.
    pub fn record_success(&mut self, at: DateTime<Utc>) -> Transition {
        let was_healthy = self.healthy;
        self.healthy = true;
        self.consecutive_errors = 0;
        self.last_error = None;
        self.last_check = Some(at);

        if was_healthy {
            Transition::None
        } else {
            Transition::BecameHealthy
        }
    }

    /// Apply a failed check.
    pub fn record_failure(
        &mut self,
        error: String,
        failure_threshold: u32,
        at: DateTime<Utc>,
    ) -> Transition {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(error);
        self.last_check = Some(at);

        if self.healthy && self.consecutive_errors >= failure_threshold {
            self.healthy = false;
            Transition::BecameUnhealthy
        } else {
            Transition::None
        }
    }
}
