//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, ARTIST_ED_ID};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_sync() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::admin(server.base_url.clone());
//!
//!     let response = client.sync("Ed Sheeran").await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

#![allow(dead_code)]

mod client;
mod constants;
mod fixtures;
mod mock_spotify;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
pub use mock_spotify::{MockSpotify, MOCK_PAGE_SIZE};
pub use server::TestServer;

/// Reads a response body as JSON, panicking with the body on failure
pub async fn json_body(response: reqwest::Response) -> serde_json::Value {
    let text = response.text().await.expect("Failed to read response body");
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("Invalid JSON ({}): {}", e, text))
}
