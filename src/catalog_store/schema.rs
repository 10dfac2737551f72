//! SQLite schema for the synced catalog.
//!
//! Primary keys are integer rowids. External catalog ids are unique but
//! nullable, so manually curated records can live next to synced ones.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, FtsTable, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const TRACK_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Core Tables
// =============================================================================

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "popularity",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "followers_total",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("sync_source", &SqlType::Text),
        sqlite_column!("last_synced", &SqlType::Integer),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_artists_sync_source", "sync_source"),
        ("idx_artists_last_synced", "last_synced"),
    ],
    unique_constraints: &[],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("album_type", &SqlType::Text, non_null = true), // 'album', 'single', 'compilation'
        sqlite_column!(
            "total_tracks",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("release_date", &SqlType::Text), // '2017-03-03', '2017-03', '2017'
        sqlite_column!("release_date_precision", &SqlType::Text),
        sqlite_column!("label", &SqlType::Text),
        sqlite_column!(
            "popularity",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("sync_source", &SqlType::Text),
        sqlite_column!("last_synced", &SqlType::Integer),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_albums_sync_source", "sync_source"),
        ("idx_albums_release_date", "release_date"),
    ],
    unique_constraints: &[],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!(
            "duration_ms",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("track_number", &SqlType::Integer),
        sqlite_column!(
            "disc_number",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "explicit",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("preview_url", &SqlType::Text),
        sqlite_column!(
            "popularity",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("lyrics", &SqlType::Text),
        sqlite_column!(
            "play_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("sync_source", &SqlType::Text),
        sqlite_column!("last_synced", &SqlType::Integer),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_tracks_album", "album_rowid"),
        ("idx_tracks_sync_source", "sync_source"),
    ],
    unique_constraints: &[],
};

const TRACK_AUDIO_FEATURES_TABLE: Table = Table {
    name: "track_audio_features",
    columns: &[
        sqlite_column!(
            "track_rowid",
            &SqlType::Integer,
            is_primary_key = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("danceability", &SqlType::Real),
        sqlite_column!("energy", &SqlType::Real),
        sqlite_column!("key", &SqlType::Integer),
        sqlite_column!("loudness", &SqlType::Real),
        sqlite_column!("mode", &SqlType::Integer),
        sqlite_column!("speechiness", &SqlType::Real),
        sqlite_column!("acousticness", &SqlType::Real),
        sqlite_column!("instrumentalness", &SqlType::Real),
        sqlite_column!("liveness", &SqlType::Real),
        sqlite_column!("valence", &SqlType::Real),
        sqlite_column!("tempo", &SqlType::Real),
        sqlite_column!("time_signature", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Junction Tables
// =============================================================================

const ALBUM_ARTISTS_TABLE: Table = Table {
    name: "album_artists",
    columns: &[
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_artists_artist", "artist_rowid")],
    unique_constraints: &[&["album_rowid", "artist_rowid"]],
};

const TRACK_ARTISTS_TABLE: Table = Table {
    name: "track_artists",
    columns: &[
        sqlite_column!(
            "track_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_track_artists_artist", "artist_rowid")],
    unique_constraints: &[&["track_rowid", "artist_rowid"]],
};

const ARTIST_GENRES_TABLE: Table = Table {
    name: "artist_genres",
    columns: &[
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("genre", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_artist_genres_genre", "genre")],
    unique_constraints: &[&["artist_rowid", "genre"]],
};

const ALBUM_GENRES_TABLE: Table = Table {
    name: "album_genres",
    columns: &[
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!("genre", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_album_genres_genre", "genre")],
    unique_constraints: &[&["album_rowid", "genre"]],
};

const ARTIST_IMAGES_TABLE: Table = Table {
    name: "artist_images",
    columns: &[
        sqlite_column!(
            "artist_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["artist_rowid", "position"]],
};

const ALBUM_IMAGES_TABLE: Table = Table {
    name: "album_images",
    columns: &[
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["album_rowid", "position"]],
};

const ALBUM_COPYRIGHTS_TABLE: Table = Table {
    name: "album_copyrights",
    columns: &[
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("text", &SqlType::Text, non_null = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true), // 'C' or 'P'
    ],
    indices: &[],
    unique_constraints: &[&["album_rowid", "position"]],
};

// =============================================================================
// Full-text search
// =============================================================================

pub const ARTISTS_FTS: &str = "artists_fts";
pub const ALBUMS_FTS: &str = "albums_fts";
pub const TRACKS_FTS: &str = "tracks_fts";

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        TRACKS_TABLE,
        TRACK_AUDIO_FEATURES_TABLE,
        ALBUM_ARTISTS_TABLE,
        TRACK_ARTISTS_TABLE,
        ARTIST_GENRES_TABLE,
        ALBUM_GENRES_TABLE,
        ARTIST_IMAGES_TABLE,
        ALBUM_IMAGES_TABLE,
        ALBUM_COPYRIGHTS_TABLE,
    ],
    fts_tables: &[
        FtsTable {
            name: ARTISTS_FTS,
            columns: &["name", "genres"],
        },
        FtsTable {
            name: ALBUMS_FTS,
            columns: &["name", "artists"],
        },
        FtsTable {
            name: TRACKS_FTS,
            columns: &["name", "artists"],
        },
    ],
    migration: None,
}];
