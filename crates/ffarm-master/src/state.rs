//! Application state.

use std::sync::Arc;

use crate::config::MasterConfig;
use crate::coordinator::LeaseCoordinator;
use crate::registry::WorkerRegistry;
use crate::store::JobStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: MasterConfig,
    pub coordinator: Arc<LeaseCoordinator>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: MasterConfig) -> Self {
        let store = Arc::new(JobStore::new());
        let registry = Arc::new(WorkerRegistry::new());
        let coordinator = Arc::new(LeaseCoordinator::new(store, registry));

        Self {
            config,
            coordinator,
        }
    }
}
