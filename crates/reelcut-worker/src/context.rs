//! Shared state handed to the dispatcher, worker slots and watchdog.

use std::sync::Arc;

use reelcut_media::MediaTool;
use reelcut_queue::{IntakeQueue, JobStore};
use reelcut_storage::StorageBackend;

use crate::active::ActiveJobs;
use crate::cleanup::CleanupManager;
use crate::config::WorkerConfig;

/// Everything a job needs while it is processed.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<JobStore>,
    pub intake: Arc<IntakeQueue>,
    pub tool: Arc<dyn MediaTool>,
    pub storage: Arc<dyn StorageBackend>,
    pub cleanup: Arc<CleanupManager>,
    pub active: ActiveJobs,
}

impl ProcessingContext {
    pub fn new(config: WorkerConfig, tool: Arc<dyn MediaTool>, storage: Arc<dyn StorageBackend>) -> Self {
        let store = Arc::new(JobStore::new());
        let cleanup = Arc::new(CleanupManager::new(
            Arc::clone(&store),
            config.cleanup_retries,
            config.cleanup_retry_delay,
        ));
        Self {
            config,
            store,
            intake: Arc::new(IntakeQueue::new()),
            tool,
            storage,
            cleanup,
            active: ActiveJobs::new(),
        }
    }
}

impl std::fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("queued", &self.intake.len())
            .field("active", &self.active.len())
            .finish()
    }
}
