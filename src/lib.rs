//! Catalog Sync Server Library
//!
//! This library exposes the internal modules for the server and CLI binaries
//! and for the end-to-end tests.

pub mod background_jobs;
pub mod catalog_api;
pub mod catalog_store;
pub mod config;
pub mod server;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use catalog_api::{CatalogApi, SpotifyClient};
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use server::{run_server, RequestsLoggingLevel};
pub use sync::SyncService;
