pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::{ClaimStore, LocationIndex};
use engine::AlertEngine;
use gateway::router::SessionRouter;

/// Shared application state available to all route handlers and sessions.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub sessions: Arc<SessionRouter>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the engine to the given backends, with the session router as its
    /// delivery gateway.
    pub fn new(
        locations: Arc<dyn LocationIndex>,
        claims: Arc<dyn ClaimStore>,
        config: Config,
    ) -> Self {
        let sessions = Arc::new(SessionRouter::new(config.session_buffer));
        let engine = AlertEngine::new(locations, claims, sessions.clone(), &config);
        Self {
            engine: Arc::new(engine),
            sessions,
            config: Arc::new(config),
        }
    }
}
