use std::sync::Arc;
use pressroom_core::{Config, Fetcher, JobCoordinator};

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<JobCoordinator>,
    fetcher: Arc<dyn Fetcher>,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<JobCoordinator>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            coordinator,
            fetcher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<JobCoordinator> {
        &self.coordinator
    }

    /// Fetcher used for source probes; the same one the coordinator downloads with.
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }
}
