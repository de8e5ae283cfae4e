//! iptime-server - REST API facade for the router client.
//!
//! Wraps the scraping client in a small JSON API so scripts and dashboards
//! can manage port forwards without speaking the router's CGI dialect.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Liveness probe (no auth)
//! - `GET /api/system/info` - Router model and firmware
//! - `GET /api/portforward` - List port-forward rules
//! - `POST /api/portforward` - Add a rule
//! - `POST /api/portforward/batch` - Add several rules in one session
//! - `GET /api/portforward/{rule}` - Fetch a rule by id or name
//! - `PUT /api/portforward/{rule}` - Update a rule by id or name
//! - `DELETE /api/portforward/{rule}` - Delete a rule by id or name
//!
//! All routes but the health check require `Authorization: Bearer <token>`
//! when an API token is configured.
//!
//! ## Example
//!
//! ```no_run
//! use iptime_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::from_env()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::env;
use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use iptime_client::RouterConfig;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 6000;

/// Default server host; the facade is meant to be reachable on the LAN.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0).
    pub host: String,
    /// Port to bind to (default: 6000).
    pub port: u16,
    /// Bearer token required on protected routes (None = open access).
    pub api_token: Option<String>,
    /// Target router.
    pub router: RouterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_token: None,
            router: RouterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `PORT` and `API_TOKEN` plus the `IPTIME_*` router variables.
    ///
    /// An unparseable `PORT` falls back to the default with a warning; an
    /// empty `API_TOKEN` means open access.
    pub fn from_env() -> Self {
        let port = match env::var("PORT") {
            Ok(raw) => match raw.parse() {
                Ok(port) => port,
                Err(_) => {
                    warn!(value = %raw, "unparseable PORT, using default");
                    DEFAULT_PORT
                }
            },
            Err(_) => DEFAULT_PORT,
        };
        let api_token = env::var("API_TOKEN").ok().filter(|token| !token.is_empty());

        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            api_token,
            router: RouterConfig::from_env(),
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Requires the given bearer token on protected routes.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the target router.
    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The HTTP API facade.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a new server with the given configuration.
    pub fn new(config: ServerConfig) -> std::result::Result<Self, ServerError> {
        Self::with_state(AppState::new(config))
    }

    /// Creates a server from existing application state.
    pub fn with_state(state: AppState) -> std::result::Result<Self, ServerError> {
        // Open CORS, the facade serves LAN dashboards on other origins
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        // Routes above the token gate are protected; the health check and
        // the fallback stay outside it
        let router = Router::new()
            .route("/api/system/info", get(handlers::system_info))
            .route("/api/portforward", get(handlers::list_rules))
            .route("/api/portforward", post(handlers::add_rule))
            .route("/api/portforward/batch", post(handlers::batch_add_rules))
            .route("/api/portforward/{rule}", get(handlers::get_rule))
            .route("/api/portforward/{rule}", put(handlers::update_rule))
            .route("/api/portforward/{rule}", delete(handlers::delete_rule))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                handlers::require_token,
            ))
            .route("/api/health", get(handlers::health))
            .fallback(handlers::endpoint_not_found)
            .layer(cors)
            .with_state(state.clone());

        let addr = format!("{}:{}", state.config.host, state.config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting ipTIME API server on {}", self.addr);

        // Create socket with SO_REUSEADDR to allow binding even when sockets are lingering
        let socket = Socket::new(Domain::for_address(self.addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Allow address reuse (helps with TIME_WAIT/CLOSE_WAIT sockets)
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Bind and listen
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Convert to tokio TcpListener
        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
