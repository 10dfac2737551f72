//! Read and curation routes over the local catalog.

use super::auth::AdminAuth;
use super::error::{ApiError, ApiResult};
use super::state::{GuardedCatalogStore, ServerState};
use crate::catalog_store::{
    Album, AlbumUpdate, Artist, ArtistUpdate, ListQuery, NewAlbum, NewArtist, NewTrack, Page,
    ResolvedAlbum, ResolvedTrack, SortOrder, TrackUpdate, TrackView,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_TOP_TRACKS: usize = 10;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum SortParam {
    Name,
    Popularity,
    ReleaseDate,
    PlayCount,
    Position,
}

impl From<SortParam> for SortOrder {
    fn from(value: SortParam) -> Self {
        match value {
            SortParam::Name => SortOrder::Name,
            SortParam::Popularity => SortOrder::PopularityDesc,
            SortParam::ReleaseDate => SortOrder::ReleaseDateDesc,
            SortParam::PlayCount => SortOrder::PlayCountDesc,
            SortParam::Position => SortOrder::AlbumPosition,
        }
    }
}

#[derive(Deserialize, Default, Debug)]
struct ListParams {
    /// 1-based page number
    page: Option<usize>,
    limit: Option<usize>,
    sort: Option<SortParam>,
    genre: Option<String>,
    #[serde(alias = "q")]
    search: Option<String>,
    year: Option<i32>,
    artist_id: Option<i64>,
    album_id: Option<i64>,
}

impl ListParams {
    fn to_query(&self, default_sort: SortOrder) -> ListQuery {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);
        ListQuery {
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            genre: self.genre.clone().filter(|s| !s.trim().is_empty()),
            year: self.year,
            artist_id: self.artist_id,
            album_id: self.album_id,
            popular_only: false,
            sort: self.sort.map(SortOrder::from).unwrap_or(default_sort),
            offset: (page - 1) * limit,
            limit,
        }
    }
}

fn not_found<T>(what: &str, id: impl std::fmt::Display) -> ApiResult<T> {
    Err(ApiError::NotFound(format!("{} {}", what, id)))
}

// =============================================================================
// Artists
// =============================================================================

async fn list_artists(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Artist>>> {
    Ok(Json(store.list_artists(&params.to_query(SortOrder::Name))?))
}

async fn popular_artists(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Artist>>> {
    let mut query = params.to_query(SortOrder::PopularityDesc);
    query.popular_only = true;
    query.sort = SortOrder::PopularityDesc;
    Ok(Json(store.list_artists(&query)?))
}

async fn artists_by_genre(
    State(store): State<GuardedCatalogStore>,
    Path(genre): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Artist>>> {
    let mut query = params.to_query(SortOrder::PopularityDesc);
    query.genre = Some(genre);
    Ok(Json(store.list_artists(&query)?))
}

async fn get_artist(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Artist>> {
    match store.get_artist(id)? {
        Some(artist) => Ok(Json(artist)),
        None => not_found("artist", id),
    }
}

async fn get_artist_by_external_id(
    State(store): State<GuardedCatalogStore>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<Artist>> {
    match store.find_artist_by_external_id(&external_id)? {
        Some(artist) => Ok(Json(artist)),
        None => not_found("artist", external_id),
    }
}

async fn get_artist_albums(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Album>>> {
    if store.get_artist(id)?.is_none() {
        return not_found("artist", id);
    }
    let mut query = params.to_query(SortOrder::ReleaseDateDesc);
    query.artist_id = Some(id);
    Ok(Json(store.list_albums(&query)?))
}

async fn get_artist_top_tracks(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<TrackView>>> {
    if store.get_artist(id)?.is_none() {
        return not_found("artist", id);
    }
    let query = ListQuery {
        artist_id: Some(id),
        sort: SortOrder::PopularityDesc,
        limit: params
            .limit
            .unwrap_or(DEFAULT_TOP_TRACKS)
            .clamp(1, MAX_PAGE_SIZE),
        ..Default::default()
    };
    let page = store.list_tracks(&query)?;
    Ok(Json(page.items.into_iter().map(TrackView::from).collect()))
}

async fn create_artist(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<NewArtist>,
) -> ApiResult<impl IntoResponse> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let artist = store.create_artist(&body)?;
    info!("Created artist {} ({})", artist.id, artist.name);
    Ok((StatusCode::CREATED, Json(artist)))
}

/// A rename may not blank the name out.
fn check_rename(name: Option<&str>) -> ApiResult<()> {
    match name {
        Some(name) if name.trim().is_empty() => {
            Err(ApiError::BadRequest("name must not be empty".to_string()))
        }
        _ => Ok(()),
    }
}

async fn update_artist(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<ArtistUpdate>,
) -> ApiResult<Json<Artist>> {
    check_rename(body.name.as_deref())?;
    match store.update_artist(id, &body)? {
        Some(artist) => {
            info!("Updated artist {} ({})", artist.id, artist.name);
            Ok(Json(artist))
        }
        None => not_found("artist", id),
    }
}

async fn delete_artist(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if store.delete_artist(id)? {
        info!("Deleted artist {} and its albums and tracks", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        not_found("artist", id)
    }
}

// =============================================================================
// Albums
// =============================================================================

#[derive(Deserialize)]
struct CreateAlbumBody {
    #[serde(flatten)]
    album: NewAlbum,
    #[serde(default)]
    artist_ids: Vec<i64>,
}

async fn list_albums(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Album>>> {
    Ok(Json(store.list_albums(&params.to_query(SortOrder::Name))?))
}

async fn popular_albums(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Album>>> {
    let mut query = params.to_query(SortOrder::PopularityDesc);
    query.popular_only = true;
    query.sort = SortOrder::PopularityDesc;
    Ok(Json(store.list_albums(&query)?))
}

async fn albums_by_year(
    State(store): State<GuardedCatalogStore>,
    Path(year): Path<i32>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Album>>> {
    let mut query = params.to_query(SortOrder::PopularityDesc);
    query.year = Some(year);
    Ok(Json(store.list_albums(&query)?))
}

async fn albums_by_genre(
    State(store): State<GuardedCatalogStore>,
    Path(genre): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Album>>> {
    let mut query = params.to_query(SortOrder::PopularityDesc);
    query.genre = Some(genre);
    Ok(Json(store.list_albums(&query)?))
}

async fn get_album(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResolvedAlbum>> {
    match store.get_resolved_album(id)? {
        Some(album) => Ok(Json(album)),
        None => not_found("album", id),
    }
}

async fn get_album_by_external_id(
    State(store): State<GuardedCatalogStore>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<Album>> {
    match store.find_album_by_external_id(&external_id)? {
        Some(album) => Ok(Json(album)),
        None => not_found("album", external_id),
    }
}

async fn get_album_tracks(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<TrackView>>> {
    match store.get_resolved_album(id)? {
        Some(album) => Ok(Json(album.tracks)),
        None => not_found("album", id),
    }
}

async fn create_album(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<CreateAlbumBody>,
) -> ApiResult<impl IntoResponse> {
    if body.album.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let album = store.create_album(&body.album, &body.artist_ids)?;
    info!("Created album {} ({})", album.id, album.name);
    Ok((StatusCode::CREATED, Json(album)))
}

async fn update_album(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<AlbumUpdate>,
) -> ApiResult<Json<Album>> {
    check_rename(body.name.as_deref())?;
    match store.update_album(id, &body)? {
        Some(album) => {
            info!("Updated album {} ({})", album.id, album.name);
            Ok(Json(album))
        }
        None => not_found("album", id),
    }
}

async fn delete_album(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if store.delete_album(id)? {
        info!("Deleted album {} and its tracks", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        not_found("album", id)
    }
}

// =============================================================================
// Tracks
// =============================================================================

#[derive(Deserialize)]
struct CreateTrackBody {
    #[serde(flatten)]
    track: NewTrack,
    #[serde(default)]
    artist_ids: Vec<i64>,
    album_id: Option<i64>,
}

#[derive(Deserialize, Serialize)]
struct LyricsBody {
    lyrics: Option<String>,
}

#[derive(Serialize)]
struct PlayCountResponse {
    play_count: i64,
}

async fn list_tracks(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<TrackView>>> {
    let page = store.list_tracks(&params.to_query(SortOrder::Name))?;
    Ok(Json(page.map(TrackView::from)))
}

async fn popular_tracks(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<TrackView>>> {
    let mut query = params.to_query(SortOrder::PopularityDesc);
    query.popular_only = true;
    query.sort = SortOrder::PopularityDesc;
    Ok(Json(store.list_tracks(&query)?.map(TrackView::from)))
}

async fn search_tracks(
    State(store): State<GuardedCatalogStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<TrackView>>> {
    let query = params.to_query(SortOrder::PopularityDesc);
    if query.search.is_none() {
        return Err(ApiError::BadRequest("q must not be empty".to_string()));
    }
    Ok(Json(store.list_tracks(&query)?.map(TrackView::from)))
}

async fn get_track(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResolvedTrack>> {
    match store.get_resolved_track(id)? {
        Some(track) => Ok(Json(track)),
        None => not_found("track", id),
    }
}

async fn get_track_by_external_id(
    State(store): State<GuardedCatalogStore>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<TrackView>> {
    match store.find_track_by_external_id(&external_id)? {
        Some(track) => Ok(Json(track.into())),
        None => not_found("track", external_id),
    }
}

async fn play_track(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PlayCountResponse>> {
    match store.increment_play_count(id)? {
        Some(play_count) => Ok(Json(PlayCountResponse { play_count })),
        None => not_found("track", id),
    }
}

async fn get_lyrics(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LyricsBody>> {
    match store.get_track(id)? {
        Some(track) => Ok(Json(LyricsBody {
            lyrics: track.lyrics,
        })),
        None => not_found("track", id),
    }
}

async fn put_lyrics(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<LyricsBody>,
) -> ApiResult<StatusCode> {
    if store.set_lyrics(id, body.lyrics.as_deref())? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        not_found("track", id)
    }
}

async fn create_track(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<CreateTrackBody>,
) -> ApiResult<impl IntoResponse> {
    if body.track.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let track = store.create_track(&body.track, &body.artist_ids, body.album_id)?;
    info!("Created track {} ({})", track.id, track.name);
    Ok((StatusCode::CREATED, Json(TrackView::from(track))))
}

async fn update_track(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<TrackUpdate>,
) -> ApiResult<Json<TrackView>> {
    check_rename(body.name.as_deref())?;
    if body.duration_ms.is_some_and(|ms| ms < 0) {
        return Err(ApiError::BadRequest("duration_ms must not be negative".to_string()));
    }
    match store.update_track(id, &body)? {
        Some(track) => {
            info!("Updated track {} ({})", track.id, track.name);
            Ok(Json(track.into()))
        }
        None => not_found("track", id),
    }
}

async fn delete_track(
    _auth: AdminAuth,
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if store.delete_track(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        not_found("track", id)
    }
}

pub fn make_catalog_routes(state: ServerState) -> Router {
    Router::new()
        .route("/artists", get(list_artists).post(create_artist))
        .route("/artists/popular", get(popular_artists))
        .route("/artists/genre/{genre}", get(artists_by_genre))
        .route("/artists/external/{external_id}", get(get_artist_by_external_id))
        .route("/artists/{id}", get(get_artist).put(update_artist).delete(delete_artist))
        .route("/artists/{id}/albums", get(get_artist_albums))
        .route("/artists/{id}/top-tracks", get(get_artist_top_tracks))
        .route("/albums", get(list_albums).post(create_album))
        .route("/albums/popular", get(popular_albums))
        .route("/albums/year/{year}", get(albums_by_year))
        .route("/albums/genre/{genre}", get(albums_by_genre))
        .route("/albums/external/{external_id}", get(get_album_by_external_id))
        .route("/albums/{id}", get(get_album).put(update_album).delete(delete_album))
        .route("/albums/{id}/tracks", get(get_album_tracks))
        .route("/tracks", get(list_tracks).post(create_track))
        .route("/tracks/popular", get(popular_tracks))
        .route("/tracks/search", get(search_tracks))
        .route("/tracks/external/{external_id}", get(get_track_by_external_id))
        .route("/tracks/{id}", get(get_track).put(update_track).delete(delete_track))
        .route("/tracks/{id}/play", post(play_track))
        .route("/tracks/{id}/lyrics", get(get_lyrics).put(put_lyrics))
        .with_state(state)
}
