//! Validation of raw catalog API payloads into store write models.
//!
//! Only the external id is mandatory. Every other field falls back to a
//! default, so a sparse payload still produces a record.

use crate::catalog_api::{RawAlbum, RawArtist, RawAudioFeatures, RawImage, RawTrack};
use crate::catalog_store::{
    AlbumType, AudioFeatures, Copyright, EntityKind, Image, NewAlbum, NewArtist, NewTrack,
    ReleaseDatePrecision, VolatileUpdate, SYNC_SOURCE_SPOTIFY,
};
use thiserror::Error;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_TRACK: &str = "Unknown Track";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("malformed {kind} payload: {reason}")]
    MalformedEntity { kind: EntityKind, reason: String },
}

fn malformed(kind: EntityKind, reason: impl Into<String>) -> MappingError {
    MappingError::MalformedEntity {
        kind,
        reason: reason.into(),
    }
}

/// The external id, which must be present and free of whitespace.
pub fn external_id(kind: EntityKind, id: Option<&str>) -> Result<String, MappingError> {
    let id = id.map(str::trim).unwrap_or_default();
    if id.is_empty() {
        return Err(malformed(kind, "missing external id"));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(malformed(kind, format!("invalid external id {:?}", id)));
    }
    Ok(id.to_string())
}

fn display_name(name: Option<&str>, fallback: &str) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

fn popularity(value: Option<i64>) -> i32 {
    value.unwrap_or(0).clamp(0, 100) as i32
}

fn images(raw: Option<&[RawImage]>) -> Vec<Image> {
    raw.unwrap_or_default()
        .iter()
        .filter_map(|image| {
            let url = image.url.as_deref()?.trim();
            (!url.is_empty()).then(|| Image {
                url: url.to_string(),
                width: image.width,
                height: image.height,
            })
        })
        .collect()
}

fn genres(raw: Option<&[String]>) -> Vec<String> {
    let mut genres: Vec<String> = Vec::new();
    for genre in raw.unwrap_or_default() {
        let genre = genre.trim();
        if !genre.is_empty() && !genres.iter().any(|g| g == genre) {
            genres.push(genre.to_string());
        }
    }
    genres
}

/// Accepts YYYY, YYYY-MM and YYYY-MM-DD. Returns the date with the precision
/// implied by its shape when the payload does not state one.
fn release_date(
    date: Option<&str>,
    precision: Option<&str>,
) -> (Option<String>, Option<ReleaseDatePrecision>) {
    let Some(date) = date.map(str::trim).filter(|d| !d.is_empty()) else {
        return (None, None);
    };
    let parts: Vec<&str> = date.split('-').collect();
    let well_formed = !parts.is_empty()
        && parts.len() <= 3
        && parts[0].len() == 4
        && parts[1..].iter().all(|p| p.len() == 2)
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return (None, None);
    }
    let implied = match parts.len() {
        1 => ReleaseDatePrecision::Year,
        2 => ReleaseDatePrecision::Month,
        _ => ReleaseDatePrecision::Day,
    };
    let precision = precision
        .and_then(ReleaseDatePrecision::from_db_str)
        .unwrap_or(implied);
    (Some(date.to_string()), Some(precision))
}

pub fn map_artist(raw: &RawArtist) -> Result<NewArtist, MappingError> {
    Ok(NewArtist {
        external_id: Some(external_id(EntityKind::Artist, raw.id.as_deref())?),
        name: display_name(raw.name.as_deref(), UNKNOWN_ARTIST),
        images: images(raw.images.as_deref()),
        genres: genres(raw.genres.as_deref()),
        popularity: popularity(raw.popularity),
        followers_total: raw
            .followers
            .as_ref()
            .and_then(|f| f.total)
            .unwrap_or(0)
            .max(0),
        sync_source: Some(SYNC_SOURCE_SPOTIFY.to_string()),
    })
}

pub fn map_album(raw: &RawAlbum) -> Result<NewAlbum, MappingError> {
    let (release_date, release_date_precision) = release_date(
        raw.release_date.as_deref(),
        raw.release_date_precision.as_deref(),
    );
    Ok(NewAlbum {
        external_id: Some(external_id(EntityKind::Album, raw.id.as_deref())?),
        name: display_name(raw.name.as_deref(), UNKNOWN_ALBUM),
        album_type: raw
            .album_type
            .as_deref()
            .and_then(AlbumType::parse)
            .unwrap_or_default(),
        total_tracks: raw.total_tracks.unwrap_or(0).clamp(0, i32::MAX as i64) as i32,
        release_date,
        release_date_precision,
        images: images(raw.images.as_deref()),
        genres: genres(raw.genres.as_deref()),
        label: raw
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
        copyrights: raw
            .copyrights
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|c| {
                let text = c.text.as_deref()?.trim();
                (!text.is_empty()).then(|| Copyright {
                    text: text.to_string(),
                    kind: c.kind.clone().unwrap_or_else(|| "C".to_string()),
                })
            })
            .collect(),
        popularity: popularity(raw.popularity),
        sync_source: Some(SYNC_SOURCE_SPOTIFY.to_string()),
    })
}

pub fn map_track(raw: &RawTrack) -> Result<NewTrack, MappingError> {
    let to_i32 = |v: i64| v.clamp(0, i32::MAX as i64) as i32;
    Ok(NewTrack {
        external_id: Some(external_id(EntityKind::Track, raw.id.as_deref())?),
        name: display_name(raw.name.as_deref(), UNKNOWN_TRACK),
        duration_ms: raw.duration_ms.unwrap_or(0).max(0),
        track_number: raw.track_number.map(to_i32),
        disc_number: raw.disc_number.map(to_i32).filter(|d| *d > 0).unwrap_or(1),
        explicit: raw.explicit.unwrap_or(false),
        preview_url: raw.preview_url.clone().filter(|u| !u.is_empty()),
        popularity: popularity(raw.popularity),
        sync_source: Some(SYNC_SOURCE_SPOTIFY.to_string()),
    })
}

/// A feature vector is stored whole or not at all: any missing field
/// rejects the payload.
pub fn map_audio_features(raw: &RawAudioFeatures) -> Result<AudioFeatures, MappingError> {
    let kind = EntityKind::Track;
    let missing: Vec<&str> = [
        ("danceability", raw.danceability.is_none()),
        ("energy", raw.energy.is_none()),
        ("key", raw.key.is_none()),
        ("loudness", raw.loudness.is_none()),
        ("mode", raw.mode.is_none()),
        ("speechiness", raw.speechiness.is_none()),
        ("acousticness", raw.acousticness.is_none()),
        ("instrumentalness", raw.instrumentalness.is_none()),
        ("liveness", raw.liveness.is_none()),
        ("valence", raw.valence.is_none()),
        ("tempo", raw.tempo.is_none()),
        ("time_signature", raw.time_signature.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    if !missing.is_empty() {
        return Err(malformed(
            kind,
            format!("audio features lack {}", missing.join(", ")),
        ));
    }

    let unit = |name: &str, value: Option<f64>| -> Result<Option<f64>, MappingError> {
        match value {
            Some(v) if !(0.0..=1.0).contains(&v) => {
                Err(malformed(kind, format!("{} {} outside [0, 1]", name, v)))
            }
            v => Ok(v),
        }
    };

    // -1 is how the API says no key was detected
    let key = match raw.key {
        Some(k) if !(-1..=11).contains(&k) => {
            return Err(malformed(kind, format!("key {} outside -1..=11", k)))
        }
        k => k.map(|k| k as i32),
    };
    let mode = match raw.mode {
        Some(m) if m != 0 && m != 1 => return Err(malformed(kind, format!("mode {} is not 0 or 1", m))),
        m => m.map(|m| m as i32),
    };
    let tempo = match raw.tempo {
        Some(t) if !t.is_finite() || t < 0.0 => {
            return Err(malformed(kind, format!("tempo {} is negative", t)))
        }
        t => t,
    };

    Ok(AudioFeatures {
        danceability: unit("danceability", raw.danceability)?,
        energy: unit("energy", raw.energy)?,
        key,
        loudness: raw.loudness,
        mode,
        speechiness: unit("speechiness", raw.speechiness)?,
        acousticness: unit("acousticness", raw.acousticness)?,
        instrumentalness: unit("instrumentalness", raw.instrumentalness)?,
        liveness: unit("liveness", raw.liveness)?,
        valence: unit("valence", raw.valence)?,
        tempo,
        time_signature: raw.time_signature.map(|t| t.clamp(0, 16) as i32),
    })
}

// =============================================================================
// Refresh payloads
// =============================================================================

pub fn artist_volatile(raw: &RawArtist, synced_at: i64) -> VolatileUpdate {
    VolatileUpdate {
        popularity: raw.popularity.map(|p| popularity(Some(p))),
        followers_total: raw.followers.as_ref().and_then(|f| f.total).map(|t| t.max(0)),
        synced_at,
    }
}

pub fn album_volatile(raw: &RawAlbum, synced_at: i64) -> VolatileUpdate {
    VolatileUpdate {
        popularity: raw.popularity.map(|p| popularity(Some(p))),
        followers_total: None,
        synced_at,
    }
}

pub fn track_volatile(raw: &RawTrack, synced_at: i64) -> VolatileUpdate {
    VolatileUpdate {
        popularity: raw.popularity.map(|p| popularity(Some(p))),
        followers_total: None,
        synced_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_api::{RawCopyright, RawFollowers};

    fn full_features(id: &str) -> RawAudioFeatures {
        RawAudioFeatures {
            id: Some(id.into()),
            danceability: Some(0.825),
            energy: Some(0.652),
            key: Some(1),
            loudness: Some(-3.183),
            mode: Some(0),
            speechiness: Some(0.0802),
            acousticness: Some(0.581),
            instrumentalness: Some(0.0),
            liveness: Some(0.0931),
            valence: Some(0.931),
            tempo: Some(95.977),
            time_signature: Some(4),
        }
    }

    #[test]
    fn artist_defaults_fill_missing_fields() {
        let artist = map_artist(&RawArtist {
            id: Some("A1".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(artist.external_id.as_deref(), Some("A1"));
        assert_eq!(artist.name, UNKNOWN_ARTIST);
        assert_eq!(artist.popularity, 0);
        assert_eq!(artist.followers_total, 0);
        assert!(artist.images.is_empty());
        assert!(artist.genres.is_empty());
        assert_eq!(artist.sync_source.as_deref(), Some(SYNC_SOURCE_SPOTIFY));
    }

    #[test]
    fn artist_without_id_is_rejected() {
        let err = map_artist(&RawArtist {
            name: Some("Ed Sheeran".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            MappingError::MalformedEntity {
                kind: EntityKind::Artist,
                reason: "missing external id".to_string()
            }
        );
        assert!(map_artist(&RawArtist {
            id: Some("  ".to_string()),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn artist_fields_are_normalized() {
        let artist = map_artist(&RawArtist {
            id: Some(" A1 ".to_string()),
            name: Some(" Ed Sheeran ".to_string()),
            genres: Some(vec!["pop".into(), " pop ".into(), "".into(), "uk pop".into()]),
            images: Some(vec![
                RawImage {
                    url: Some("https://i.scdn.co/a.jpg".into()),
                    width: Some(640),
                    height: Some(640),
                },
                RawImage::default(),
            ]),
            popularity: Some(140),
            followers: Some(RawFollowers { total: Some(-3) }),
        })
        .unwrap();
        assert_eq!(artist.external_id.as_deref(), Some("A1"));
        assert_eq!(artist.name, "Ed Sheeran");
        assert_eq!(artist.genres, vec!["pop", "uk pop"]);
        assert_eq!(artist.images.len(), 1);
        assert_eq!(artist.popularity, 100);
        assert_eq!(artist.followers_total, 0);
    }

    #[test]
    fn album_release_date_and_type() {
        let album = map_album(&RawAlbum {
            id: Some("AL1".into()),
            name: Some("÷".into()),
            album_type: Some("compilation".into()),
            release_date: Some("2017-03".into()),
            copyrights: Some(vec![
                RawCopyright {
                    text: Some("(C) 2017 Asylum".into()),
                    kind: Some("P".into()),
                },
                RawCopyright::default(),
            ]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(album.name, "÷");
        assert_eq!(album.album_type, AlbumType::Compilation);
        assert_eq!(album.release_date.as_deref(), Some("2017-03"));
        assert_eq!(album.release_date_precision, Some(ReleaseDatePrecision::Month));
        assert_eq!(album.copyrights.len(), 1);
        assert_eq!(album.copyrights[0].kind, "P");

        let odd = map_album(&RawAlbum {
            id: Some("AL2".into()),
            release_date: Some("03/03/2017".into()),
            album_type: Some("appears_on".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(odd.release_date, None);
        assert_eq!(odd.album_type, AlbumType::Album);
        assert_eq!(odd.name, UNKNOWN_ALBUM);
    }

    #[test]
    fn track_defaults() {
        let track = map_track(&RawTrack {
            id: Some("T1".into()),
            duration_ms: Some(-5),
            disc_number: Some(0),
            preview_url: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(track.name, UNKNOWN_TRACK);
        assert_eq!(track.duration_ms, 0);
        assert_eq!(track.disc_number, 1);
        assert_eq!(track.preview_url, None);
        assert!(!track.explicit);
    }

    #[test]
    fn audio_features_are_range_checked() {
        let good = full_features("T1");
        let features = map_audio_features(&good).unwrap();
        assert_eq!(features.key, Some(1));
        assert_eq!(features.tempo, Some(95.977));
        assert_eq!(features.valence, Some(0.931));

        let bad_unit = RawAudioFeatures {
            energy: Some(1.5),
            ..good.clone()
        };
        assert!(map_audio_features(&bad_unit).is_err());

        let bad_key = RawAudioFeatures {
            key: Some(12),
            ..good.clone()
        };
        assert!(map_audio_features(&bad_key).is_err());

        let bad_mode = RawAudioFeatures {
            mode: Some(2),
            ..good
        };
        assert!(map_audio_features(&bad_mode).is_err());

        assert!(map_audio_features(&RawAudioFeatures {
            id: Some("T1".into()),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn partial_audio_features_are_rejected() {
        let tempo_only = RawAudioFeatures {
            id: Some("T1".into()),
            tempo: Some(96.0),
            ..Default::default()
        };
        let err = map_audio_features(&tempo_only).unwrap_err();
        assert!(err.to_string().contains("danceability"));

        let no_tempo = RawAudioFeatures {
            tempo: None,
            ..full_features("T1")
        };
        let err = map_audio_features(&no_tempo).unwrap_err();
        assert!(err.to_string().contains("tempo"));

        let no_key_detected = RawAudioFeatures {
            key: Some(-1),
            ..full_features("T1")
        };
        assert_eq!(map_audio_features(&no_key_detected).unwrap().key, Some(-1));
    }

    #[test]
    fn volatile_updates_keep_missing_fields_unset() {
        let update = artist_volatile(
            &RawArtist {
                id: Some("A1".into()),
                popularity: Some(88),
                ..Default::default()
            },
            42,
        );
        assert_eq!(update.popularity, Some(88));
        assert_eq!(update.followers_total, None);
        assert_eq!(update.synced_at, 42);

        let update = track_volatile(&RawTrack::default(), 7);
        assert_eq!(update.popularity, None);
    }
}
