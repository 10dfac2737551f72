use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::catalog_store::CatalogStore;
use crate::sync::SyncService;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type GuardedSyncService = Arc<SyncService>;
pub type OptionalSchedulerHandle = Option<SchedulerHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub sync_service: GuardedSyncService,
    pub scheduler_handle: OptionalSchedulerHandle,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        sync_service: GuardedSyncService,
        scheduler_handle: OptionalSchedulerHandle,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            catalog_store: sync_service.store().clone(),
            sync_service,
            scheduler_handle,
        }
    }
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedSyncService {
    fn from_ref(input: &ServerState) -> Self {
        input.sync_service.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for OptionalSchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}
