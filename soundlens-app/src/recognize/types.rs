//! Recognition provider response types
//!
//! Deserialized from the provider's JSON and converted into the normalized
//! `Track` model. `status.code == 0` means success with candidate tracks in
//! `metadata.music` (first candidate is authoritative); any other
//! application status is a no-match.

use serde::Deserialize;
use soundlens_common::models::{Album, Artist, ExternalRef, Track};
use std::collections::BTreeMap;

/// Top-level provider response
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    pub status: ProviderStatus,
    #[serde(default)]
    pub metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderStatus {
    pub code: i32,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default)]
    pub music: Vec<ProviderMusic>,
}

/// One candidate track as reported by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMusic {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<ProviderArtist>,
    #[serde(default)]
    pub album: Option<ProviderAlbum>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<ProviderGenre>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub external_metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderArtist {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAlbum {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderGenre {
    #[serde(default)]
    pub name: String,
}

impl ProviderMusic {
    /// Convert the provider candidate into the immutable Track model
    pub fn into_track(self) -> Track {
        let external_refs = self
            .external_metadata
            .iter()
            .filter_map(|(provider, value)| {
                extract_external_ref(provider, value).map(|r| (provider.clone(), r))
            })
            .collect();

        Track {
            title: self.title,
            artists: self
                .artists
                .into_iter()
                .filter(|a| !a.name.is_empty())
                .map(|a| Artist { name: a.name })
                .collect(),
            album: Album {
                name: self.album.map(|a| a.name).unwrap_or_default(),
                cover_art_url: None,
            },
            release_date: self.release_date,
            genres: self
                .genres
                .into_iter()
                .filter(|g| !g.name.is_empty())
                .map(|g| g.name)
                .collect(),
            label: self.label,
            external_refs,
            score: self.score,
        }
    }
}

/// Pull a provider-specific track id (and cover art, when present) out of
/// the loosely structured external_metadata blob
///
/// Known shapes:
/// - spotify/deezer/applemusic: `{"track": {"id": ...}, "album": {"images": [...]}}`
/// - youtube: `{"vid": "..."}`
fn extract_external_ref(provider: &str, value: &serde_json::Value) -> Option<ExternalRef> {
    let id = match provider {
        "youtube" => value.get("vid")?.as_str()?.to_string(),
        _ => {
            let id = value.get("track")?.get("id")?;
            match id {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            }
        }
    };

    let cover_art_url = value
        .get("album")
        .and_then(|album| album.get("images"))
        .and_then(|images| match images {
            serde_json::Value::Array(arr) => arr.first(),
            _ => None,
        })
        .and_then(|image| {
            image
                .as_str()
                .map(str::to_string)
                .or_else(|| image.get("url").and_then(|u| u.as_str()).map(str::to_string))
        });

    Some(ExternalRef { id, cover_art_url })
}
