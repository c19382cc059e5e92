//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Config endpoints
//!     → registry.rs (expand ports, drop disabled)
//!     → backend.rs (immutable descriptors)
//!
//! Model resolved to candidate backends
//!     → connections.rs (live in-flight counters)
//!     → least_conn.rs (pick backend with fewest in-flight requests)
//!     → ConnectionGuard held for the request's lifetime
//! ```
//!
//! # Design Decisions
//! - Backends are immutable; mutable state is keyed by backend name
//! - Unhealthy backends never reach selection (filtered upstream)
//! - Ties resolve by discovery order so selection is deterministic

pub mod backend;
pub mod connections;
pub mod least_conn;
pub mod registry;

pub use backend::Backend;
pub use connections::{Completion, ConnectionGuard, ConnectionTracker};
pub use registry::BackendRegistry;
