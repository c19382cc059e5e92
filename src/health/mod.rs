//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     schedule.rs tick (interval, or manual trigger in tests)
//!     → Check every backend concurrently
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//!     Threshold on the way down, single success on the way up
//! ```
//!
//! # Design Decisions
//! - Health state is per-backend and owned by the monitor alone
//! - Every check carries its own timeout; one hung backend cannot stall a cycle
//! - The healthy set feeds model discovery and the dispatcher's live scan

pub mod active;
pub mod schedule;
pub mod state;

pub use active::{HealthCheckError, HealthMonitor};
pub use schedule::{IntervalSchedule, ManualSchedule, ManualTrigger, Schedule};
pub use state::HealthStatus;
