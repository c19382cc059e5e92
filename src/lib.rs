//! Inference gateway library.
//!
//! Fronts a fleet of OpenAI-compatible inference servers behind one endpoint:
//! aggregates their model lists, routes each chat completion to the least
//! loaded healthy backend serving the requested model, and relays the
//! response (streamed or not) back unchanged.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
