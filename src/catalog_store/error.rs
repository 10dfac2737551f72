use super::models::EntityKind;
use thiserror::Error;

/// Store failures callers are expected to tell apart. Anything else travels
/// as a plain `anyhow::Error`; callers use `downcast_ref` to find these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogStoreError {
    #[error("{kind} with external id {external_id} already exists")]
    Conflict {
        kind: EntityKind,
        external_id: String,
    },

    #[error("referenced {kind} {id} does not exist")]
    InvalidReference { kind: EntityKind, id: i64 },

    #[error("{kind} requires an external id to be resolved")]
    MissingExternalId { kind: EntityKind },
}
