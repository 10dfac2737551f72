//! SQLite-backed catalog store.
//!
//! Writes go through a single connection behind a mutex and run inside
//! `BEGIN IMMEDIATE` transactions, which is what makes resolve-or-create
//! atomic. Reads are spread over a small round-robin pool of read-only
//! connections.

use super::error::CatalogStoreError;
use super::models::*;
use super::schema::{ALBUMS_FTS, ARTISTS_FTS, CATALOG_VERSIONED_SCHEMAS, TRACKS_FTS};
use super::trait_def::CatalogStore;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Artist => "artists",
        EntityKind::Album => "albums",
        EntityKind::Track => "tracks",
    }
}

/// Turn free text into an FTS5 query: every token quoted and prefix matched.
fn fts_match_expression(search: &str) -> Option<String> {
    let tokens: Vec<String> = search
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"*", t))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn like_contains(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// WHERE clause under construction, with positional parameters.
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    fn push(&mut self, clause: &str, value: Value) {
        self.values.push(value);
        self.clauses
            .push(clause.replace("?", &format!("?{}", self.values.len())));
    }

    fn push_bare(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

impl SqliteCatalogStore {
    /// Open (creating if needed) the catalog database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database {:?}", db_path))?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;
        write_conn.busy_timeout(BUSY_TIMEOUT)?;
        migrate_if_needed(&mut write_conn, CATALOG_VERSIONED_SCHEMAS)?;

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.busy_timeout(BUSY_TIMEOUT)?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = SqliteCatalogStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        };

        let counts = store.count_all()?;
        info!(
            "Opened catalog: {} artists, {} albums, {} tracks",
            counts.artists, counts.albums, counts.tracks
        );
        Ok(store)
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let index = self.read_index.fetch_add(1, Ordering::Relaxed) % self.read_pool.len();
        let conn = self.read_pool[index]
            .lock()
            .map_err(|_| anyhow!("catalog read connection mutex poisoned"))?;
        f(&conn)
    }

    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .write_conn
            .lock()
            .map_err(|_| anyhow!("catalog write connection mutex poisoned"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // =========================================================================
    // Internal Helper Methods
    // =========================================================================

    fn get_rowid_by_external_id(
        conn: &Connection,
        kind: EntityKind,
        external_id: &str,
    ) -> Result<Option<i64>> {
        match conn.query_row(
            &format!(
                "SELECT rowid FROM {} WHERE external_id = ?1",
                table_for(kind)
            ),
            params![external_id],
            |r| r.get(0),
        ) {
            Ok(rowid) => Ok(Some(rowid)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(conn: &Connection, kind: EntityKind, id: i64) -> Result<bool> {
        Ok(conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE rowid = ?1", table_for(kind)),
                params![id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn ensure_references(
        conn: &Connection,
        artist_ids: &[i64],
        album_id: Option<i64>,
    ) -> Result<()> {
        for &artist_id in artist_ids {
            if !Self::exists(conn, EntityKind::Artist, artist_id)? {
                return Err(CatalogStoreError::InvalidReference {
                    kind: EntityKind::Artist,
                    id: artist_id,
                }
                .into());
            }
        }
        if let Some(album_id) = album_id {
            if !Self::exists(conn, EntityKind::Album, album_id)? {
                return Err(CatalogStoreError::InvalidReference {
                    kind: EntityKind::Album,
                    id: album_id,
                }
                .into());
            }
        }
        Ok(())
    }

    fn artist_names(conn: &Connection, artist_ids: &[i64]) -> Result<String> {
        let mut names = Vec::with_capacity(artist_ids.len());
        for id in artist_ids {
            let name: Option<String> = conn
                .query_row(
                    "SELECT name FROM artists WHERE rowid = ?1",
                    params![id],
                    |r| r.get(0),
                )
                .optional()?;
            names.extend(name);
        }
        Ok(names.join(" "))
    }

    fn load_images(conn: &Connection, table: &str, owner_column: &str, id: i64) -> Result<Vec<Image>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT url, width, height FROM {} WHERE {} = ?1 ORDER BY position",
            table, owner_column
        ))?;
        let images = stmt
            .query_map(params![id], |r| {
                Ok(Image {
                    url: r.get(0)?,
                    width: r.get(1)?,
                    height: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    fn load_column_list<T: rusqlite::types::FromSql>(
        conn: &Connection,
        sql: &str,
        id: i64,
    ) -> Result<Vec<T>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let values = stmt
            .query_map(params![id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(values)
    }

    fn load_artist(conn: &Connection, id: i64) -> Result<Option<Artist>> {
        let row = conn
            .query_row(
                "SELECT rowid, external_id, name, popularity, followers_total, sync_source, last_synced
                 FROM artists WHERE rowid = ?1",
                params![id],
                |r| {
                    Ok(Artist {
                        id: r.get(0)?,
                        external_id: r.get(1)?,
                        name: r.get(2)?,
                        popularity: r.get(3)?,
                        followers_total: r.get(4)?,
                        sync_source: r.get(5)?,
                        last_synced: r.get(6)?,
                        images: vec![],
                        genres: vec![],
                    })
                },
            )
            .optional()?;
        let Some(mut artist) = row else {
            return Ok(None);
        };
        artist.images = Self::load_images(conn, "artist_images", "artist_rowid", id)?;
        artist.genres = Self::load_column_list(
            conn,
            "SELECT genre FROM artist_genres WHERE artist_rowid = ?1 ORDER BY rowid",
            id,
        )?;
        Ok(Some(artist))
    }

    fn load_album(conn: &Connection, id: i64) -> Result<Option<Album>> {
        let row = conn
            .query_row(
                "SELECT rowid, external_id, name, album_type, total_tracks, release_date,
                        release_date_precision, label, popularity, sync_source, last_synced
                 FROM albums WHERE rowid = ?1",
                params![id],
                |r| {
                    Ok(Album {
                        id: r.get(0)?,
                        external_id: r.get(1)?,
                        name: r.get(2)?,
                        album_type: AlbumType::from_db_str(&r.get::<_, String>(3)?),
                        total_tracks: r.get(4)?,
                        release_date: r.get(5)?,
                        release_date_precision: r
                            .get::<_, Option<String>>(6)?
                            .as_deref()
                            .and_then(ReleaseDatePrecision::from_db_str),
                        label: r.get(7)?,
                        popularity: r.get(8)?,
                        sync_source: r.get(9)?,
                        last_synced: r.get(10)?,
                        artist_ids: vec![],
                        images: vec![],
                        genres: vec![],
                        copyrights: vec![],
                    })
                },
            )
            .optional()?;
        let Some(mut album) = row else {
            return Ok(None);
        };
        album.artist_ids = Self::load_column_list(
            conn,
            "SELECT artist_rowid FROM album_artists WHERE album_rowid = ?1 ORDER BY position",
            id,
        )?;
        album.images = Self::load_images(conn, "album_images", "album_rowid", id)?;
        album.genres = Self::load_column_list(
            conn,
            "SELECT genre FROM album_genres WHERE album_rowid = ?1 ORDER BY rowid",
            id,
        )?;
        let mut stmt = conn.prepare_cached(
            "SELECT text, kind FROM album_copyrights WHERE album_rowid = ?1 ORDER BY position",
        )?;
        album.copyrights = stmt
            .query_map(params![id], |r| {
                Ok(Copyright {
                    text: r.get(0)?,
                    kind: r.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(album))
    }

    fn load_track(conn: &Connection, id: i64) -> Result<Option<Track>> {
        let row = conn
            .query_row(
                "SELECT rowid, external_id, name, album_rowid, duration_ms, track_number, disc_number,
                        explicit, preview_url, popularity, lyrics, play_count, sync_source, last_synced
                 FROM tracks WHERE rowid = ?1",
                params![id],
                |r| {
                    Ok(Track {
                        id: r.get(0)?,
                        external_id: r.get(1)?,
                        name: r.get(2)?,
                        album_id: r.get(3)?,
                        duration_ms: r.get(4)?,
                        track_number: r.get(5)?,
                        disc_number: r.get(6)?,
                        explicit: r.get::<_, i64>(7)? != 0,
                        preview_url: r.get(8)?,
                        popularity: r.get(9)?,
                        lyrics: r.get(10)?,
                        play_count: r.get(11)?,
                        sync_source: r.get(12)?,
                        last_synced: r.get(13)?,
                        artist_ids: vec![],
                        audio_features: None,
                    })
                },
            )
            .optional()?;
        let Some(mut track) = row else {
            return Ok(None);
        };
        track.artist_ids = Self::load_column_list(
            conn,
            "SELECT artist_rowid FROM track_artists WHERE track_rowid = ?1 ORDER BY position",
            id,
        )?;
        track.audio_features = conn
            .query_row(
                "SELECT danceability, energy, key, loudness, mode, speechiness, acousticness,
                        instrumentalness, liveness, valence, tempo, time_signature
                 FROM track_audio_features WHERE track_rowid = ?1",
                params![id],
                |r| {
                    Ok(AudioFeatures {
                        danceability: r.get(0)?,
                        energy: r.get(1)?,
                        key: r.get(2)?,
                        loudness: r.get(3)?,
                        mode: r.get(4)?,
                        speechiness: r.get(5)?,
                        acousticness: r.get(6)?,
                        instrumentalness: r.get(7)?,
                        liveness: r.get(8)?,
                        valence: r.get(9)?,
                        tempo: r.get(10)?,
                        time_signature: r.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(Some(track))
    }

    fn load_by_external_id<T>(
        &self,
        kind: EntityKind,
        external_id: &str,
        load: fn(&Connection, i64) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        self.read(|conn| match Self::get_rowid_by_external_id(conn, kind, external_id)? {
            Some(id) => load(conn, id),
            None => Ok(None),
        })
    }

    /// Replace the genre set of an artist or album.
    fn write_genres(conn: &Connection, kind: EntityKind, id: i64, genres: &[String]) -> Result<()> {
        let (table, owner) = match kind {
            EntityKind::Artist => ("artist_genres", "artist_rowid"),
            _ => ("album_genres", "album_rowid"),
        };
        conn.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, owner), params![id])?;
        for genre in genres {
            conn.execute(
                &format!("INSERT OR IGNORE INTO {} ({}, genre) VALUES (?1, ?2)", table, owner),
                params![id, genre],
            )?;
        }
        Ok(())
    }

    fn write_images(conn: &Connection, kind: EntityKind, id: i64, images: &[Image]) -> Result<()> {
        let (table, owner) = match kind {
            EntityKind::Artist => ("artist_images", "artist_rowid"),
            _ => ("album_images", "album_rowid"),
        };
        conn.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, owner), params![id])?;
        for (position, image) in images.iter().enumerate() {
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}, position, url, width, height) VALUES (?1, ?2, ?3, ?4, ?5)",
                    table, owner
                ),
                params![id, position as i64, image.url, image.width, image.height],
            )?;
        }
        Ok(())
    }

    /// Replace the ordered artist credits of an album or track.
    fn write_credits(conn: &Connection, kind: EntityKind, id: i64, artist_ids: &[i64]) -> Result<()> {
        let (table, owner) = match kind {
            EntityKind::Track => ("track_artists", "track_rowid"),
            _ => ("album_artists", "album_rowid"),
        };
        conn.execute(&format!("DELETE FROM {} WHERE {} = ?1", table, owner), params![id])?;
        for (position, artist_id) in artist_ids.iter().enumerate() {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} ({}, artist_rowid, position) VALUES (?1, ?2, ?3)",
                    table, owner
                ),
                params![id, artist_id, position as i64],
            )?;
        }
        Ok(())
    }

    /// Rebuild the search index row of one record from its stored state.
    fn reindex(conn: &Connection, kind: EntityKind, id: i64) -> Result<()> {
        let name: String = conn.query_row(
            &format!("SELECT name FROM {} WHERE rowid = ?1", table_for(kind)),
            params![id],
            |r| r.get(0),
        )?;
        let (fts, extra_column, extra) = match kind {
            EntityKind::Artist => {
                let genres: Vec<String> = Self::load_column_list(
                    conn,
                    "SELECT genre FROM artist_genres WHERE artist_rowid = ?1 ORDER BY rowid",
                    id,
                )?;
                (ARTISTS_FTS, "genres", genres.join(" "))
            }
            EntityKind::Album => {
                let artist_ids: Vec<i64> = Self::load_column_list(
                    conn,
                    "SELECT artist_rowid FROM album_artists WHERE album_rowid = ?1 ORDER BY position",
                    id,
                )?;
                (ALBUMS_FTS, "artists", Self::artist_names(conn, &artist_ids)?)
            }
            EntityKind::Track => {
                let artist_ids: Vec<i64> = Self::load_column_list(
                    conn,
                    "SELECT artist_rowid FROM track_artists WHERE track_rowid = ?1 ORDER BY position",
                    id,
                )?;
                (TRACKS_FTS, "artists", Self::artist_names(conn, &artist_ids)?)
            }
        };
        conn.execute(&format!("DELETE FROM {} WHERE rowid = ?1", fts), params![id])?;
        conn.execute(
            &format!(
                "INSERT INTO {} (rowid, name, {}) VALUES (?1, ?2, ?3)",
                fts, extra_column
            ),
            params![id, name, extra],
        )?;
        Ok(())
    }

    /// `UPDATE table SET ... WHERE rowid = id` over the given columns.
    fn update_columns(conn: &Connection, kind: EntityKind, id: i64, columns: Vec<(&str, Value)>) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect();
        let mut values: Vec<Value> = columns.into_iter().map(|(_, value)| value).collect();
        values.push(Value::Integer(id));
        conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE rowid = ?{}",
                table_for(kind),
                assignments.join(", "),
                values.len()
            ),
            params_from_iter(values.iter()),
        )?;
        Ok(())
    }

    fn insert_artist(conn: &Connection, artist: &NewArtist) -> Result<i64> {
        let synced_at = artist.sync_source.as_ref().map(|_| now_secs());
        conn.execute(
            "INSERT INTO artists (external_id, name, popularity, followers_total, sync_source, last_synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                artist.external_id,
                artist.name,
                artist.popularity,
                artist.followers_total,
                artist.sync_source,
                synced_at
            ],
        )?;
        let id = conn.last_insert_rowid();

        Self::write_genres(conn, EntityKind::Artist, id, &artist.genres)?;
        Self::write_images(conn, EntityKind::Artist, id, &artist.images)?;
        Self::reindex(conn, EntityKind::Artist, id)?;
        Ok(id)
    }

    fn insert_album(conn: &Connection, album: &NewAlbum, artist_ids: &[i64]) -> Result<i64> {
        Self::ensure_references(conn, artist_ids, None)?;
        let synced_at = album.sync_source.as_ref().map(|_| now_secs());
        conn.execute(
            "INSERT INTO albums (external_id, name, album_type, total_tracks, release_date,
                                 release_date_precision, label, popularity, sync_source, last_synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                album.external_id,
                album.name,
                album.album_type.to_db_str(),
                album.total_tracks,
                album.release_date,
                album.release_date_precision.map(|p| p.to_db_str()),
                album.label,
                album.popularity,
                album.sync_source,
                synced_at
            ],
        )?;
        let id = conn.last_insert_rowid();

        Self::write_credits(conn, EntityKind::Album, id, artist_ids)?;
        Self::write_genres(conn, EntityKind::Album, id, &album.genres)?;
        Self::write_images(conn, EntityKind::Album, id, &album.images)?;
        for (position, copyright) in album.copyrights.iter().enumerate() {
            conn.execute(
                "INSERT INTO album_copyrights (album_rowid, position, text, kind)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, position as i64, copyright.text, copyright.kind],
            )?;
        }
        Self::reindex(conn, EntityKind::Album, id)?;
        Ok(id)
    }

    fn insert_track(
        conn: &Connection,
        track: &NewTrack,
        artist_ids: &[i64],
        album_id: Option<i64>,
    ) -> Result<i64> {
        Self::ensure_references(conn, artist_ids, album_id)?;
        let synced_at = track.sync_source.as_ref().map(|_| now_secs());
        conn.execute(
            "INSERT INTO tracks (external_id, name, album_rowid, duration_ms, track_number, disc_number,
                                 explicit, preview_url, popularity, sync_source, last_synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                track.external_id,
                track.name,
                album_id,
                track.duration_ms,
                track.track_number,
                track.disc_number,
                track.explicit as i64,
                track.preview_url,
                track.popularity,
                track.sync_source,
                synced_at
            ],
        )?;
        let id = conn.last_insert_rowid();

        Self::write_credits(conn, EntityKind::Track, id, artist_ids)?;
        Self::reindex(conn, EntityKind::Track, id)?;
        Ok(id)
    }

    fn ensure_no_conflict(conn: &Connection, kind: EntityKind, external_id: Option<&str>) -> Result<()> {
        if let Some(external_id) = external_id {
            if Self::get_rowid_by_external_id(conn, kind, external_id)?.is_some() {
                return Err(CatalogStoreError::Conflict {
                    kind,
                    external_id: external_id.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn resolve_or_insert(
        &self,
        kind: EntityKind,
        external_id: Option<&str>,
        insert: impl FnOnce(&Connection) -> Result<i64>,
    ) -> Result<Resolution> {
        let external_id = external_id
            .filter(|id| !id.is_empty())
            .ok_or(CatalogStoreError::MissingExternalId { kind })?;
        self.write(|conn| {
            if let Some(id) = Self::get_rowid_by_external_id(conn, kind, external_id)? {
                return Ok(Resolution { id, created: false });
            }
            let id = insert(conn)?;
            debug!("Created {} {} for external id {}", kind, id, external_id);
            Ok(Resolution { id, created: true })
        })
    }

    fn delete_tracks(conn: &Connection, track_ids: &[i64]) -> Result<usize> {
        for id in track_ids {
            conn.execute(
                &format!("DELETE FROM {} WHERE rowid = ?1", TRACKS_FTS),
                params![id],
            )?;
            conn.execute("DELETE FROM tracks WHERE rowid = ?1", params![id])?;
        }
        Ok(track_ids.len())
    }

    fn delete_albums(conn: &Connection, album_ids: &[i64]) -> Result<usize> {
        let mut deleted_tracks = 0;
        for id in album_ids {
            let track_ids: Vec<i64> = Self::load_column_list(
                conn,
                "SELECT rowid FROM tracks WHERE album_rowid = ?1",
                *id,
            )?;
            deleted_tracks += Self::delete_tracks(conn, &track_ids)?;
            conn.execute(
                &format!("DELETE FROM {} WHERE rowid = ?1", ALBUMS_FTS),
                params![id],
            )?;
            conn.execute("DELETE FROM albums WHERE rowid = ?1", params![id])?;
        }
        Ok(deleted_tracks)
    }

    fn count(conn: &Connection, kind: EntityKind, sync_source: Option<&str>) -> Result<usize> {
        let count: i64 = match sync_source {
            Some(source) => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE sync_source = ?1",
                    table_for(kind)
                ),
                params![source],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table_for(kind)),
                [],
                |r| r.get(0),
            )?,
        };
        Ok(count as usize)
    }

    fn page<T>(
        &self,
        from_sql: &str,
        filter: &Filter,
        order_sql: &str,
        query: &ListQuery,
        load: fn(&Connection, i64) -> Result<Option<T>>,
    ) -> Result<Page<T>> {
        self.read(|conn| {
            let where_sql = filter.where_sql();
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}{}", from_sql, where_sql),
                params_from_iter(filter.values.iter()),
                |r| r.get(0),
            )?;

            let mut values = filter.values.clone();
            values.push(Value::Integer(query.limit as i64));
            values.push(Value::Integer(query.offset as i64));
            let n = values.len();
            let mut stmt = conn.prepare(&format!(
                "SELECT rowid FROM {}{} ORDER BY {} LIMIT ?{} OFFSET ?{}",
                from_sql,
                where_sql,
                order_sql,
                n - 1,
                n
            ))?;
            let ids = stmt
                .query_map(params_from_iter(values.iter()), |r| r.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut items = Vec::with_capacity(ids.len());
            for id in ids {
                items.extend(load(conn, id)?);
            }
            Ok(Page {
                items,
                total: total as usize,
                offset: query.offset,
                limit: query.limit,
            })
        })
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        self.read(|conn| Self::load_artist(conn, id))
    }

    fn get_album(&self, id: i64) -> Result<Option<Album>> {
        self.read(|conn| Self::load_album(conn, id))
    }

    fn get_track(&self, id: i64) -> Result<Option<Track>> {
        self.read(|conn| Self::load_track(conn, id))
    }

    fn find_artist_by_external_id(&self, external_id: &str) -> Result<Option<Artist>> {
        self.load_by_external_id(EntityKind::Artist, external_id, Self::load_artist)
    }

    fn find_album_by_external_id(&self, external_id: &str) -> Result<Option<Album>> {
        self.load_by_external_id(EntityKind::Album, external_id, Self::load_album)
    }

    fn find_track_by_external_id(&self, external_id: &str) -> Result<Option<Track>> {
        self.load_by_external_id(EntityKind::Track, external_id, Self::load_track)
    }

    fn get_resolved_album(&self, id: i64) -> Result<Option<ResolvedAlbum>> {
        self.read(|conn| {
            let Some(album) = Self::load_album(conn, id)? else {
                return Ok(None);
            };
            let mut artists = Vec::with_capacity(album.artist_ids.len());
            for artist_id in &album.artist_ids {
                artists.extend(Self::load_artist(conn, *artist_id)?);
            }
            let track_ids: Vec<i64> = Self::load_column_list(
                conn,
                "SELECT rowid FROM tracks WHERE album_rowid = ?1
                 ORDER BY disc_number, track_number, rowid",
                id,
            )?;
            let mut tracks = Vec::with_capacity(track_ids.len());
            for track_id in track_ids {
                tracks.extend(Self::load_track(conn, track_id)?.map(TrackView::from));
            }
            Ok(Some(ResolvedAlbum {
                album,
                artists,
                tracks,
            }))
        })
    }

    fn get_resolved_track(&self, id: i64) -> Result<Option<ResolvedTrack>> {
        self.read(|conn| {
            let Some(track) = Self::load_track(conn, id)? else {
                return Ok(None);
            };
            let album = match track.album_id {
                Some(album_id) => Self::load_album(conn, album_id)?,
                None => None,
            };
            let mut artists = Vec::with_capacity(track.artist_ids.len());
            for artist_id in &track.artist_ids {
                artists.extend(Self::load_artist(conn, *artist_id)?);
            }
            Ok(Some(ResolvedTrack {
                track: track.into(),
                album,
                artists,
            }))
        })
    }

    fn list_artists(&self, query: &ListQuery) -> Result<Page<Artist>> {
        let mut filter = Filter::default();
        if let Some(expr) = query.search.as_deref().and_then(fts_match_expression) {
            filter.push(
                &format!(
                    "rowid IN (SELECT rowid FROM {} WHERE {} MATCH ?)",
                    ARTISTS_FTS, ARTISTS_FTS
                ),
                Value::Text(expr),
            );
        }
        if let Some(genre) = &query.genre {
            filter.push(
                "EXISTS (SELECT 1 FROM artist_genres g WHERE g.artist_rowid = artists.rowid AND g.genre LIKE ? ESCAPE '\\')",
                Value::Text(like_contains(genre)),
            );
        }
        if query.popular_only {
            filter.push_bare("popularity > 0");
        }
        let order = match query.sort {
            SortOrder::PopularityDesc => "popularity DESC, rowid",
            _ => "name COLLATE NOCASE, rowid",
        };
        self.page("artists", &filter, order, query, Self::load_artist)
    }

    fn list_albums(&self, query: &ListQuery) -> Result<Page<Album>> {
        let mut filter = Filter::default();
        if let Some(expr) = query.search.as_deref().and_then(fts_match_expression) {
            filter.push(
                &format!(
                    "rowid IN (SELECT rowid FROM {} WHERE {} MATCH ?)",
                    ALBUMS_FTS, ALBUMS_FTS
                ),
                Value::Text(expr),
            );
        }
        if let Some(genre) = &query.genre {
            filter.push(
                "(EXISTS (SELECT 1 FROM album_genres g WHERE g.album_rowid = albums.rowid AND g.genre LIKE ? ESCAPE '\\')
                  OR EXISTS (SELECT 1 FROM album_artists aa JOIN artist_genres g ON g.artist_rowid = aa.artist_rowid
                             WHERE aa.album_rowid = albums.rowid AND g.genre LIKE ? ESCAPE '\\'))",
                Value::Text(like_contains(genre)),
            );
        }
        if let Some(year) = query.year {
            filter.push(
                "substr(release_date, 1, 4) = ?",
                Value::Text(format!("{:04}", year)),
            );
        }
        if let Some(artist_id) = query.artist_id {
            filter.push(
                "EXISTS (SELECT 1 FROM album_artists aa WHERE aa.album_rowid = albums.rowid AND aa.artist_rowid = ?)",
                Value::Integer(artist_id),
            );
        }
        if query.popular_only {
            filter.push_bare("popularity > 0");
        }
        let order = match query.sort {
            SortOrder::PopularityDesc => "popularity DESC, rowid",
            SortOrder::ReleaseDateDesc => "release_date DESC, rowid",
            _ => "name COLLATE NOCASE, rowid",
        };
        self.page("albums", &filter, order, query, Self::load_album)
    }

    fn list_tracks(&self, query: &ListQuery) -> Result<Page<Track>> {
        let mut filter = Filter::default();
        if let Some(expr) = query.search.as_deref().and_then(fts_match_expression) {
            filter.push(
                &format!(
                    "rowid IN (SELECT rowid FROM {} WHERE {} MATCH ?)",
                    TRACKS_FTS, TRACKS_FTS
                ),
                Value::Text(expr),
            );
        }
        if let Some(genre) = &query.genre {
            filter.push(
                "EXISTS (SELECT 1 FROM track_artists ta JOIN artist_genres g ON g.artist_rowid = ta.artist_rowid
                         WHERE ta.track_rowid = tracks.rowid AND g.genre LIKE ? ESCAPE '\\')",
                Value::Text(like_contains(genre)),
            );
        }
        if let Some(year) = query.year {
            filter.push(
                "EXISTS (SELECT 1 FROM albums al WHERE al.rowid = tracks.album_rowid AND substr(al.release_date, 1, 4) = ?)",
                Value::Text(format!("{:04}", year)),
            );
        }
        if let Some(artist_id) = query.artist_id {
            filter.push(
                "EXISTS (SELECT 1 FROM track_artists ta WHERE ta.track_rowid = tracks.rowid AND ta.artist_rowid = ?)",
                Value::Integer(artist_id),
            );
        }
        if let Some(album_id) = query.album_id {
            filter.push("album_rowid = ?", Value::Integer(album_id));
        }
        if query.popular_only {
            filter.push_bare("popularity > 0");
        }
        let order = match query.sort {
            SortOrder::PopularityDesc => "popularity DESC, rowid",
            SortOrder::PlayCountDesc => "play_count DESC, rowid",
            SortOrder::AlbumPosition => "album_rowid, disc_number, track_number, rowid",
            SortOrder::ReleaseDateDesc => {
                "(SELECT release_date FROM albums al WHERE al.rowid = tracks.album_rowid) DESC, rowid"
            }
            SortOrder::Name => "name COLLATE NOCASE, rowid",
        };
        self.page("tracks", &filter, order, query, Self::load_track)
    }

    fn resolve_or_create_artist(&self, artist: &NewArtist) -> Result<Resolution> {
        self.resolve_or_insert(EntityKind::Artist, artist.external_id.as_deref(), |conn| {
            Self::insert_artist(conn, artist)
        })
    }

    fn resolve_or_create_album(&self, album: &NewAlbum, artist_ids: &[i64]) -> Result<Resolution> {
        self.resolve_or_insert(EntityKind::Album, album.external_id.as_deref(), |conn| {
            Self::insert_album(conn, album, artist_ids)
        })
    }

    fn resolve_or_create_track(
        &self,
        track: &NewTrack,
        artist_ids: &[i64],
        album_id: Option<i64>,
    ) -> Result<Resolution> {
        self.resolve_or_insert(EntityKind::Track, track.external_id.as_deref(), |conn| {
            Self::insert_track(conn, track, artist_ids, album_id)
        })
    }

    fn list_synced(&self, kind: EntityKind) -> Result<Vec<SyncedRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT rowid, external_id, name FROM {}
                 WHERE sync_source IS NOT NULL AND external_id IS NOT NULL ORDER BY rowid",
                table_for(kind)
            ))?;
            let records = stmt
                .query_map([], |r| {
                    Ok(SyncedRecord {
                        id: r.get(0)?,
                        external_id: r.get(1)?,
                        name: r.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    fn apply_volatile_update(
        &self,
        kind: EntityKind,
        id: i64,
        update: &VolatileUpdate,
    ) -> Result<bool> {
        self.write(|conn| {
            let changed = match kind {
                EntityKind::Artist => conn.execute(
                    "UPDATE artists SET popularity = COALESCE(?1, popularity),
                                        followers_total = COALESCE(?2, followers_total),
                                        last_synced = ?3
                     WHERE rowid = ?4",
                    params![update.popularity, update.followers_total, update.synced_at, id],
                )?,
                EntityKind::Album | EntityKind::Track => conn.execute(
                    &format!(
                        "UPDATE {} SET popularity = COALESCE(?1, popularity), last_synced = ?2
                         WHERE rowid = ?3",
                        table_for(kind)
                    ),
                    params![update.popularity, update.synced_at, id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    fn tracks_missing_audio_features(&self, limit: usize) -> Result<Vec<SyncedRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.rowid, t.external_id, t.name FROM tracks t
                 WHERE t.external_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM track_audio_features f WHERE f.track_rowid = t.rowid)
                 ORDER BY t.rowid LIMIT ?1",
            )?;
            let records = stmt
                .query_map(params![limit as i64], |r| {
                    Ok(SyncedRecord {
                        id: r.get(0)?,
                        external_id: r.get(1)?,
                        name: r.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    fn set_audio_features(&self, track_external_id: &str, features: &AudioFeatures) -> Result<bool> {
        self.write(|conn| {
            let Some(id) = Self::get_rowid_by_external_id(conn, EntityKind::Track, track_external_id)?
            else {
                return Ok(false);
            };
            conn.execute(
                "INSERT OR REPLACE INTO track_audio_features
                    (track_rowid, danceability, energy, key, loudness, mode, speechiness, acousticness,
                     instrumentalness, liveness, valence, tempo, time_signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id,
                    features.danceability,
                    features.energy,
                    features.key,
                    features.loudness,
                    features.mode,
                    features.speechiness,
                    features.acousticness,
                    features.instrumentalness,
                    features.liveness,
                    features.valence,
                    features.tempo,
                    features.time_signature
                ],
            )?;
            Ok(true)
        })
    }

    fn count_synced(&self) -> Result<CatalogCounts> {
        self.read(|conn| {
            Ok(CatalogCounts {
                artists: Self::count(conn, EntityKind::Artist, Some(SYNC_SOURCE_SPOTIFY))?,
                albums: Self::count(conn, EntityKind::Album, Some(SYNC_SOURCE_SPOTIFY))?,
                tracks: Self::count(conn, EntityKind::Track, Some(SYNC_SOURCE_SPOTIFY))?,
            })
        })
    }

    fn count_all(&self) -> Result<CatalogCounts> {
        self.read(|conn| {
            Ok(CatalogCounts {
                artists: Self::count(conn, EntityKind::Artist, None)?,
                albums: Self::count(conn, EntityKind::Album, None)?,
                tracks: Self::count(conn, EntityKind::Track, None)?,
            })
        })
    }

    fn latest_artist_sync(&self) -> Result<Option<i64>> {
        self.read(|conn| {
            let latest: Option<i64> = conn.query_row(
                "SELECT MAX(last_synced) FROM artists WHERE sync_source = ?1",
                params![SYNC_SOURCE_SPOTIFY],
                |r| r.get(0),
            )?;
            Ok(latest)
        })
    }

    fn create_artist(&self, artist: &NewArtist) -> Result<Artist> {
        let id = self.write(|conn| {
            Self::ensure_no_conflict(conn, EntityKind::Artist, artist.external_id.as_deref())?;
            Self::insert_artist(conn, artist)
        })?;
        self.get_artist(id)?
            .with_context(|| format!("artist {} vanished after insert", id))
    }

    fn create_album(&self, album: &NewAlbum, artist_ids: &[i64]) -> Result<Album> {
        let id = self.write(|conn| {
            Self::ensure_no_conflict(conn, EntityKind::Album, album.external_id.as_deref())?;
            Self::insert_album(conn, album, artist_ids)
        })?;
        self.get_album(id)?
            .with_context(|| format!("album {} vanished after insert", id))
    }

    fn create_track(
        &self,
        track: &NewTrack,
        artist_ids: &[i64],
        album_id: Option<i64>,
    ) -> Result<Track> {
        let id = self.write(|conn| {
            Self::ensure_no_conflict(conn, EntityKind::Track, track.external_id.as_deref())?;
            Self::insert_track(conn, track, artist_ids, album_id)
        })?;
        self.get_track(id)?
            .with_context(|| format!("track {} vanished after insert", id))
    }

    fn update_artist(&self, id: i64, update: &ArtistUpdate) -> Result<Option<Artist>> {
        self.write(|conn| {
            if !Self::exists(conn, EntityKind::Artist, id)? {
                return Ok(None);
            }
            let mut columns = Vec::new();
            if let Some(name) = &update.name {
                columns.push(("name", Value::Text(name.clone())));
            }
            Self::update_columns(conn, EntityKind::Artist, id, columns)?;
            if let Some(genres) = &update.genres {
                Self::write_genres(conn, EntityKind::Artist, id, genres)?;
            }
            if let Some(images) = &update.images {
                Self::write_images(conn, EntityKind::Artist, id, images)?;
            }
            Self::reindex(conn, EntityKind::Artist, id)?;

            // Credited names are part of the album and track search rows.
            if update.name.is_some() {
                let album_ids: Vec<i64> = Self::load_column_list(
                    conn,
                    "SELECT album_rowid FROM album_artists WHERE artist_rowid = ?1",
                    id,
                )?;
                for album_id in album_ids {
                    Self::reindex(conn, EntityKind::Album, album_id)?;
                }
                let track_ids: Vec<i64> = Self::load_column_list(
                    conn,
                    "SELECT track_rowid FROM track_artists WHERE artist_rowid = ?1",
                    id,
                )?;
                for track_id in track_ids {
                    Self::reindex(conn, EntityKind::Track, track_id)?;
                }
            }
            Self::load_artist(conn, id)
        })
    }

    fn update_album(&self, id: i64, update: &AlbumUpdate) -> Result<Option<Album>> {
        self.write(|conn| {
            if !Self::exists(conn, EntityKind::Album, id)? {
                return Ok(None);
            }
            if let Some(artist_ids) = &update.artist_ids {
                Self::ensure_references(conn, artist_ids, None)?;
            }
            let mut columns = Vec::new();
            if let Some(name) = &update.name {
                columns.push(("name", Value::Text(name.clone())));
            }
            if let Some(album_type) = update.album_type {
                columns.push(("album_type", Value::Text(album_type.to_db_str().to_string())));
            }
            if let Some(release_date) = &update.release_date {
                columns.push(("release_date", Value::Text(release_date.clone())));
            }
            if let Some(precision) = update.release_date_precision {
                columns.push((
                    "release_date_precision",
                    Value::Text(precision.to_db_str().to_string()),
                ));
            }
            if let Some(label) = &update.label {
                columns.push(("label", Value::Text(label.clone())));
            }
            Self::update_columns(conn, EntityKind::Album, id, columns)?;
            if let Some(genres) = &update.genres {
                Self::write_genres(conn, EntityKind::Album, id, genres)?;
            }
            if let Some(images) = &update.images {
                Self::write_images(conn, EntityKind::Album, id, images)?;
            }
            if let Some(artist_ids) = &update.artist_ids {
                Self::write_credits(conn, EntityKind::Album, id, artist_ids)?;
            }
            Self::reindex(conn, EntityKind::Album, id)?;
            Self::load_album(conn, id)
        })
    }

    fn update_track(&self, id: i64, update: &TrackUpdate) -> Result<Option<Track>> {
        self.write(|conn| {
            if !Self::exists(conn, EntityKind::Track, id)? {
                return Ok(None);
            }
            Self::ensure_references(
                conn,
                update.artist_ids.as_deref().unwrap_or_default(),
                update.album_id,
            )?;
            let mut columns = Vec::new();
            if let Some(name) = &update.name {
                columns.push(("name", Value::Text(name.clone())));
            }
            if let Some(duration_ms) = update.duration_ms {
                columns.push(("duration_ms", Value::Integer(duration_ms)));
            }
            if let Some(track_number) = update.track_number {
                columns.push(("track_number", Value::Integer(track_number as i64)));
            }
            if let Some(disc_number) = update.disc_number {
                columns.push(("disc_number", Value::Integer(disc_number as i64)));
            }
            if let Some(explicit) = update.explicit {
                columns.push(("explicit", Value::Integer(explicit as i64)));
            }
            if let Some(preview_url) = &update.preview_url {
                columns.push(("preview_url", Value::Text(preview_url.clone())));
            }
            if let Some(album_id) = update.album_id {
                columns.push(("album_rowid", Value::Integer(album_id)));
            }
            Self::update_columns(conn, EntityKind::Track, id, columns)?;
            if let Some(artist_ids) = &update.artist_ids {
                Self::write_credits(conn, EntityKind::Track, id, artist_ids)?;
            }
            Self::reindex(conn, EntityKind::Track, id)?;
            Self::load_track(conn, id)
        })
    }

    fn delete_artist(&self, id: i64) -> Result<bool> {
        self.write(|conn| {
            if !Self::exists(conn, EntityKind::Artist, id)? {
                return Ok(false);
            }
            let track_ids: Vec<i64> = Self::load_column_list(
                conn,
                "SELECT track_rowid FROM track_artists WHERE artist_rowid = ?1",
                id,
            )?;
            let deleted_tracks = Self::delete_tracks(conn, &track_ids)?;

            let album_ids: Vec<i64> = Self::load_column_list(
                conn,
                "SELECT album_rowid FROM album_artists WHERE artist_rowid = ?1",
                id,
            )?;
            let album_tracks = Self::delete_albums(conn, &album_ids)?;

            conn.execute(
                &format!("DELETE FROM {} WHERE rowid = ?1", ARTISTS_FTS),
                params![id],
            )?;
            conn.execute("DELETE FROM artists WHERE rowid = ?1", params![id])?;
            info!(
                "Deleted artist {} with {} albums and {} tracks",
                id,
                album_ids.len(),
                deleted_tracks + album_tracks
            );
            Ok(true)
        })
    }

    fn delete_album(&self, id: i64) -> Result<bool> {
        self.write(|conn| {
            if !Self::exists(conn, EntityKind::Album, id)? {
                return Ok(false);
            }
            let deleted_tracks = Self::delete_albums(conn, &[id])?;
            info!("Deleted album {} with {} tracks", id, deleted_tracks);
            Ok(true)
        })
    }

    fn delete_track(&self, id: i64) -> Result<bool> {
        self.write(|conn| {
            if !Self::exists(conn, EntityKind::Track, id)? {
                return Ok(false);
            }
            Self::delete_tracks(conn, &[id])?;
            Ok(true)
        })
    }

    fn increment_play_count(&self, id: i64) -> Result<Option<i64>> {
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE tracks SET play_count = play_count + 1 WHERE rowid = ?1",
                params![id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let count = conn.query_row(
                "SELECT play_count FROM tracks WHERE rowid = ?1",
                params![id],
                |r| r.get(0),
            )?;
            Ok(Some(count))
        })
    }

    fn set_lyrics(&self, id: i64, lyrics: Option<&str>) -> Result<bool> {
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE tracks SET lyrics = ?1 WHERE rowid = ?2",
                params![lyrics, id],
            )?;
            Ok(changed > 0)
        })
    }
}
