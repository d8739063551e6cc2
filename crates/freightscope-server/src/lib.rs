//! HTTP API for freightscope.
//!
//! # Endpoints
//!
//! - `POST /api/v1/investigate`: answer one question
//! - `GET /api/v1/tools`: the tool catalog and its version
//! - `GET /health`: liveness
//!
//! # Example
//!
//! ```ignore
//! use freightscope_server::Server;
//!
//! let server = Server::new(investigator, config.server());
//! server.run_until(shutdown_signal()).await?;
//! ```

pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use error::{ErrorResponse, Result, ServerError};
pub use logging::request_logging_middleware;
pub use routes::{HealthResponse, InvestigateRequest, Preferences, ToolsResponse};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, middleware};
use freightscope_config::ServerConfig;
use freightscope_investigate::Investigator;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The freightscope HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(investigator: Investigator, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(investigator, config),
        }
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        use axum::routing::{get, post};

        let api = Router::new()
            .route("/investigate", post(routes::investigate_handler))
            .route("/tools", get(routes::list_tools_handler));

        let mut router = Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", api)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                logging::request_logging_middleware,
            ))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.state.config.max_body_size))
            .layer(TraceLayer::new_for_http());

        if let Some(cors) = cors_layer(&self.state.config.cors_origins) {
            router = router.layer(cors);
        }

        router.with_state(self.state.clone())
    }

    /// Bind the configured address and serve forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_address()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, "Starting server");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Server stopped");
        Ok(())
    }

    /// The configured bind address.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let bind = &self.state.config.bind;
        bind.parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{}': {}", bind, e)))
    }
}

/// CORS for the configured origins; `*` allows any origin.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(layer.allow_origin(allowed))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::Router;
    use freightscope_config::ServerConfig;
    use freightscope_investigate::Investigator;
    use freightscope_llm::{MockBackend, SharedBackend};
    use freightscope_store::MockStore;

    use crate::Server;

    pub fn router() -> Router {
        router_with_backend(Arc::new(MockBackend::with_text("ok")))
    }

    pub fn router_with_backend(backend: SharedBackend) -> Router {
        router_with_config(
            backend,
            ServerConfig {
                request_logging: false,
                ..Default::default()
            },
        )
    }

    pub fn router_with_config(backend: SharedBackend, config: ServerConfig) -> Router {
        let investigator = Investigator::builder()
            .with_backend(backend)
            .with_store(Arc::new(MockStore::new()))
            .build()
            .expect("failed to create test investigator");
        Server::new(investigator, config).router()
    }

    pub fn router_with_investigator(investigator: Investigator) -> Router {
        let config = ServerConfig {
            request_logging: false,
            ..Default::default()
        };
        Server::new(investigator, config).router()
    }
}
