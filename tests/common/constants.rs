//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When the mock catalog changes, update only this file.

// ============================================================================
// Credentials
// ============================================================================

/// Admin bearer token accepted by the test server
pub const ADMIN_TOKEN: &str = "test-admin-token";

pub const SPOTIFY_CLIENT_ID: &str = "test-client-id";

pub const SPOTIFY_CLIENT_SECRET: &str = "test-client-secret";

// ============================================================================
// Mock Catalog IDs
// ============================================================================

/// External id of "Ed Sheeran"
pub const ARTIST_ED_ID: &str = "A1";
pub const ARTIST_ED_NAME: &str = "Ed Sheeran";

/// External id of "Justin Bieber", only credited on the collaboration album
pub const ARTIST_JB_ID: &str = "A2";
pub const ARTIST_JB_NAME: &str = "Justin Bieber";

/// External id of "÷" by Ed Sheeran
pub const ALBUM_DIVIDE_ID: &str = "AL1";
pub const ALBUM_DIVIDE_NAME: &str = "÷";

/// External id of "No.6 Collaborations Project" by Ed Sheeran and Justin Bieber
pub const ALBUM_COLLAB_ID: &str = "AL2";

/// Tracks of "÷"
pub const TRACK_ERASER_ID: &str = "T1";
pub const TRACK_CASTLE_ID: &str = "T2";
pub const TRACK_DIVE_ID: &str = "T3";

/// The only track of the collaboration album, credited to both artists
pub const TRACK_COLLAB_ID: &str = "T4";

pub const GENRE_POP: &str = "pop";

pub const DIVIDE_RELEASE_YEAR: i32 = 2017;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// HTTP request timeout for test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
