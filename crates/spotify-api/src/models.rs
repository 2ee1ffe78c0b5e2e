//! Response models
//!
//! Only the fields the views use are modelled; unknown fields are ignored.
//! Spotify returns `null` for tracks that were removed or are unavailable
//! in the user's market, so playlist items carry an optional track.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// `GET /me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

impl UserProfile {
    /// Display name, falling back to the user id.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn avatar(&self) -> Option<&Image> {
        self.images.first()
    }
}

/// One page of a paginated collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackCount {
    #[serde(default)]
    pub total: u32,
}

/// Simplified playlist from `GET /me/playlists`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: TrackCount,
}

/// Entry of `GET /playlists/{id}/tracks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

impl Album {
    /// Smallest cover Spotify usually sends (third size), else the first.
    pub fn thumbnail(&self) -> Option<&Image> {
        self.images.get(2).or_else(|| self.images.first())
    }
}

/// A track (episodes decode too, without artists or album).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub album: Option<Album>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Track {
    /// Artist names joined with ", ".
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `GET /me/player/currently-playing` with a 200 body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<Track>,
}
