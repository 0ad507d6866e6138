//! Application state.

use std::sync::Arc;

use reelcut_storage::StorageBackend;
use reelcut_worker::Dispatcher;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub dispatcher: Dispatcher,
    pub storage: Arc<dyn StorageBackend>,
}

impl AppState {
    pub fn new(config: ApiConfig, dispatcher: Dispatcher, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            config,
            dispatcher,
            storage,
        }
    }
}
