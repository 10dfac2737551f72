//! Raw catalog API payloads.
//!
//! Every field is optional: payloads are decoded leniently here and
//! validated into store models by the sync mapping layer.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawImage {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawFollowers {
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawArtist {
    pub id: Option<String>,
    pub name: Option<String>,
    pub genres: Option<Vec<String>>,
    pub images: Option<Vec<RawImage>>,
    pub popularity: Option<i64>,
    pub followers: Option<RawFollowers>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawCopyright {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawAlbum {
    pub id: Option<String>,
    pub name: Option<String>,
    pub album_type: Option<String>,
    pub total_tracks: Option<i64>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub artists: Option<Vec<RawArtist>>,
    pub images: Option<Vec<RawImage>>,
    pub genres: Option<Vec<String>>,
    pub label: Option<String>,
    pub copyrights: Option<Vec<RawCopyright>>,
    pub popularity: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    pub artists: Option<Vec<RawArtist>>,
    pub duration_ms: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub explicit: Option<bool>,
    pub preview_url: Option<String>,
    pub popularity: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawAudioFeatures {
    pub id: Option<String>,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i64>,
    pub loudness: Option<f64>,
    pub mode: Option<i64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub time_signature: Option<i64>,
}

// =============================================================================
// Envelopes
// =============================================================================

/// One page of an offset-paginated listing. Entries stay undecoded until
/// `into_items`, so one entry of the wrong shape does not sink the page.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawPage {
    #[serde(default)]
    pub items: Vec<Value>,
    pub next: Option<String>,
}

impl RawPage {
    pub fn into_items<T: DeserializeOwned + Default>(self, what: &str) -> Vec<T> {
        self.items
            .into_iter()
            .map(|item| match serde_json::from_value(item) {
                Ok(decoded) => decoded,
                Err(e) => {
                    // An empty payload has no id and is rejected by the mapping layer.
                    warn!("Undecodable entry in {}: {}", what, e);
                    T::default()
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearchResponse {
    pub artists: Option<RawPage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAudioFeaturesResponse {
    #[serde(default)]
    pub audio_features: Vec<Value>,
}

impl RawAudioFeaturesResponse {
    /// One slot per requested id. Slots that are null or do not decode are `None`.
    pub fn into_slots(self) -> Vec<Option<RawAudioFeatures>> {
        self.audio_features
            .into_iter()
            .map(|slot| {
                if slot.is_null() {
                    return None;
                }
                serde_json::from_value(slot)
                    .map_err(|e| warn!("Undecodable audio features slot: {}", e))
                    .ok()
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTokenResponse {
    pub access_token: String,
    pub expires_in: Option<u64>,
}
