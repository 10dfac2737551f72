//! Mock catalog content served by the fake Spotify API
//!
//! Two artists, two albums and four tracks. The collaboration album is
//! credited to both artists, so a search matching both reaches it twice.

use super::constants::*;
use serde_json::{json, Value};

pub struct MockAlbum {
    pub album: Value,
    pub tracks: Vec<Value>,
}

pub struct MockCatalogData {
    pub artists: Vec<Value>,
    pub albums: Vec<MockAlbum>,
}

fn artist_ref(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

fn track(id: &str, name: &str, number: i64, artists: &[Value]) -> Value {
    json!({
        "id": id,
        "name": name,
        "artists": artists,
        "duration_ms": 180_000 + number * 1000,
        "track_number": number,
        "disc_number": 1,
        "explicit": false,
        "preview_url": null,
        "popularity": 60 + number
    })
}

/// Builds the default mock catalog
pub fn default_catalog() -> MockCatalogData {
    let ed = artist_ref(ARTIST_ED_ID, ARTIST_ED_NAME);
    let jb = artist_ref(ARTIST_JB_ID, ARTIST_JB_NAME);

    let artists = vec![
        json!({
            "id": ARTIST_ED_ID,
            "name": ARTIST_ED_NAME,
            "genres": [GENRE_POP, "uk pop"],
            "images": [{ "url": "https://img.example/ed.jpg", "width": 640, "height": 640 }],
            "popularity": 90,
            "followers": { "total": 1000 }
        }),
        json!({
            "id": ARTIST_JB_ID,
            "name": ARTIST_JB_NAME,
            "genres": ["canadian pop"],
            "images": [],
            "popularity": 85,
            "followers": { "total": 800 }
        }),
    ];

    let divide = MockAlbum {
        album: json!({
            "id": ALBUM_DIVIDE_ID,
            "name": ALBUM_DIVIDE_NAME,
            "album_type": "album",
            "total_tracks": 3,
            "release_date": "2017-03-03",
            "release_date_precision": "day",
            "artists": [ed.clone()],
            "images": [{ "url": "https://img.example/divide.jpg", "width": 300, "height": 300 }],
            "label": "Asylum",
            "copyrights": [{ "text": "2017 Asylum", "type": "P" }],
            "popularity": 80
        }),
        tracks: vec![
            track(TRACK_ERASER_ID, "Eraser", 1, &[ed.clone()]),
            track(TRACK_CASTLE_ID, "Castle on the Hill", 2, &[ed.clone()]),
            track(TRACK_DIVE_ID, "Dive", 3, &[ed.clone()]),
        ],
    };

    let collab = MockAlbum {
        album: json!({
            "id": ALBUM_COLLAB_ID,
            "name": "No.6 Collaborations Project",
            "album_type": "album",
            "total_tracks": 1,
            "release_date": "2019-07",
            "release_date_precision": "month",
            "artists": [ed.clone(), jb.clone()],
            "popularity": 70
        }),
        tracks: vec![track(TRACK_COLLAB_ID, "I Don't Care", 1, &[ed, jb])],
    };

    MockCatalogData {
        artists,
        albums: vec![divide, collab],
    }
}

/// Audio features payload for one track
pub fn audio_features(track_id: &str) -> Value {
    json!({
        "id": track_id,
        "danceability": 0.6,
        "energy": 0.7,
        "key": 5,
        "loudness": -5.2,
        "mode": 1,
        "speechiness": 0.05,
        "acousticness": 0.2,
        "instrumentalness": 0.0,
        "liveness": 0.1,
        "valence": 0.5,
        "tempo": 96.0,
        "time_signature": 4
    })
}
