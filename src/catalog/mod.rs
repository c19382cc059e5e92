//! Model catalog subsystem.
//!
//! # Data Flow
//! ```text
//! GET /v1/models, dispatcher lookup
//!     → cache.rs (fresh snapshot? return it)
//!     → otherwise discovery.rs on every healthy backend, concurrently
//!     → merge + dedup into a new CatalogSnapshot
//!     → publish with one atomic swap
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; readers never see a half-built mapping
//! - A failing backend contributes an empty list, never an error
//! - TTL is derived from config on every freshness check

pub mod cache;
pub mod discovery;
pub mod model;

pub use cache::{CatalogSnapshot, ModelCatalog};
pub use discovery::{fetch_models, DiscoveryError, DISCOVERY_TIMEOUT, LIVE_SCAN_TIMEOUT};
pub use model::{Model, ModelList};
