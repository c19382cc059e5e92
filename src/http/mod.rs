//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID set, traced, echoed)
//!     → handlers.rs
//!         /v1/models           → catalog
//!         /v1/chat/completions → dispatch (streamed back verbatim)
//!         /health              → health monitor + connection tracker
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use handlers::HealthReport;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, ServerError};
