use crate::sync::SyncService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Reconcile and refresh entry points over the catalog.
    pub sync_service: Arc<SyncService>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, sync_service: Arc<SyncService>) -> Self {
        Self {
            cancellation_token,
            sync_service,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
