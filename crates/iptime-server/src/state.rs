//! Application state for the API facade.

use std::sync::Arc;

use crate::ServerConfig;

/// Shared application state.
///
/// The facade holds no router session; every request opens and closes its
/// own. State is just the immutable configuration.
#[derive(Clone)]
pub struct AppState {
    /// Facade configuration, including the target router.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Creates application state from a server configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}
