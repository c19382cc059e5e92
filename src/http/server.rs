//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared components (health monitor, tracker, catalog, dispatcher)
//! - Create the Axum router and wire up middleware (request id, tracing,
//!   panic recovery, body limit, timeouts on the short routes)
//! - Run the health monitor for the lifetime of the server
//! - Apply endpoint changes from the config watcher
//! - Serve until shutdown, then stop the background work

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::catalog::ModelCatalog;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::health::{HealthMonitor, IntervalSchedule};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::{shutdown::wait as wait_for_shutdown, Shutdown};
use crate::load_balancer::{BackendRegistry, ConnectionTracker};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthMonitor>,
    pub catalog: Arc<ModelCatalog>,
    pub tracker: Arc<ConnectionTracker>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Build every component from `config`. Nothing is started.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServerError> {
        // Backends live on private networks; never route them through a proxy.
        let client = reqwest::Client::builder().no_proxy().build()?;

        let registry = BackendRegistry::from_config(&config.endpoints);
        let health = Arc::new(HealthMonitor::new(registry, config.health_check.clone()));
        let tracker = Arc::new(ConnectionTracker::new());
        let catalog = Arc::new(ModelCatalog::new(
            health.clone(),
            tracker.clone(),
            client.clone(),
            config.cache.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            catalog.clone(),
            health.clone(),
            tracker.clone(),
            client,
        ));

        Ok(Self {
            health,
            catalog,
            tracker,
            dispatcher,
        })
    }

    /// Apply a reloaded configuration. Only the endpoint list takes effect;
    /// the other sections are read once at startup.
    pub fn apply_config(&self, config: &GatewayConfig) {
        let registry = BackendRegistry::from_config(&config.endpoints);
        tracing::info!(backends = registry.len(), "Applying reloaded endpoint configuration");
        self.health.reload(registry);
        self.catalog.clear_cache();
    }
}

/// HTTP server for the inference gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let state = AppState::from_config(&config)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        // Chat completions stream for as long as the backend keeps writing,
        // so only the short routes get a deadline.
        let chat = Router::new()
            .route("/v1/chat/completions", post(handlers::chat_completions))
            .layer(DefaultBodyLimit::max(config.server.max_body_bytes));

        let api = Router::new()
            .route("/v1/models", get(handlers::list_models))
            .route("/health", get(handlers::health))
            .route("/health/force-check", post(handlers::force_check))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )));

        Router::new()
            .merge(chat)
            .merge(api)
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id(request),
                        )
                    }))
                    .layer(propagate_request_id_layer())
                    .layer(CatchPanicLayer::custom(handlers::handle_panic)),
            )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server on `listener` until `shutdown` fires.
    ///
    /// The health monitor runs alongside the server and is stopped once the
    /// last in-flight request has finished.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.state.health.registry().len(),
            "HTTP server starting"
        );

        self.state
            .health
            .start(IntervalSchedule::new(self.config.health_check.interval()));

        let state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                state.apply_config(&config);
            }
        });

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for_shutdown(shutdown.subscribe()))
            .await;

        reloader.abort();
        self.state.health.stop();
        result?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
