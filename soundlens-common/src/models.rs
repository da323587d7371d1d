//! Core data model for SoundLens
//!
//! Tracks are constructed once from a recognition provider response and are
//! immutable afterwards. History entries wrap a track with a client-assigned
//! id and timestamp; the id is assigned exactly once by the writer that
//! first observes the match and is never regenerated during sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single credited artist on a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// Album information for a track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,

    /// Cover art URL, if the provider supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_art_url: Option<String>,
}

/// Provider-specific identifiers for a track (spotify, youtube, deezer, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    /// Provider-scoped track identifier
    pub id: String,

    /// Cover art URL sourced from this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_art_url: Option<String>,
}

/// Identified track metadata
///
/// Ordered artists, album, genres and a mapping from provider name
/// ("spotify", "youtube", "deezer", "applemusic") to provider identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde(default)]
    pub album: Album,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Provider name -> external identifiers
    #[serde(default)]
    pub external_refs: BTreeMap<String, ExternalRef>,

    /// Provider match confidence (0-100), if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Track {
    /// Name of the first credited artist, if any
    ///
    /// Used as half of the debounce-dedup key (title + first artist).
    pub fn first_artist_name(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }
}

/// Outcome of one recognition attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    /// The provider identified a track
    Matched { track: Track },
    /// The provider answered but found no match (a valid outcome, not an error)
    NoMatch,
    /// Transport or parse failure talking to the provider
    Failed { reason: String },
}

/// One entry in the recognition history log
///
/// Immutable after creation; deletion removes, never mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Client-assigned id, stable across local and remote replicas
    pub id: Uuid,

    /// Creation instant, assigned by the client (merge ordering is stable
    /// across replicas because the remote never re-stamps it)
    pub timestamp: DateTime<Utc>,

    pub track: Track,
}

impl HistoryEntry {
    /// Create a new entry for a freshly matched track
    pub fn new(track: Track) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            track,
        }
    }
}

/// Owner identity for history rows
///
/// Anonymous identities are locally generated, durable, and used as the
/// sync key until sign-in supersedes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Anonymous(Uuid),
    User(String),
}

impl Identity {
    /// Opaque owner key as stored in the remote datastore's owner column
    pub fn owner_key(&self) -> String {
        match self {
            Identity::Anonymous(id) => format!("anon:{}", id),
            Identity::User(id) => format!("user:{}", id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous(_))
    }
}
