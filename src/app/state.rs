//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::clock::{Clock, SystemClock};
use crate::game::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// State whose matches read time from `clock`
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new(clock)),
        }
    }
}
