//! Per-reconcile resolution cache.
//!
//! Maps external ids to resolved store records for the duration of one
//! reconcile call. Each external id gets its own `OnceCell`, so concurrent
//! walkers asking for the same id wait on a single resolution instead of
//! racing to the store.

use crate::catalog_store::Resolution;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Resolution>>;

/// A cache lookup result. `first` is true only for the caller whose
/// initializer actually ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cached {
    pub resolution: Resolution,
    pub first: bool,
}

#[derive(Default)]
pub struct ResolutionCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, external_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(external_id.to_string()).or_default().clone()
    }

    /// Resolve `external_id`, running `init` only if no earlier call in this
    /// cache succeeded. A failed `init` leaves the slot empty for later callers.
    pub async fn resolve<E, F, Fut>(&self, external_id: &str, init: F) -> Result<Cached, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resolution, E>>,
    {
        let slot = self.slot(external_id);
        let mut first = false;
        let resolution = *slot
            .get_or_try_init(|| {
                first = true;
                init()
            })
            .await?;
        Ok(Cached { resolution, first })
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }
}
