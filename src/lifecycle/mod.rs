//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build components → Start health monitor → Listen
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop health monitor → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a bad config at startup is fatal
//! - Long-lived streams are not cut by a deadline; shutdown waits for them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
