//! Typed facade over the Spotify Web API
//!
//! Every call goes through `AuthClient::authorized_fetch`, so callers get
//! refresh-before-expiry and the single 401 retry for free. Responses are
//! decoded into the small set of models the views render; anything outside
//! 2xx becomes `Error::Request` naming the endpoint and status.

pub mod client;
pub mod error;
pub mod models;

pub use client::{DEFAULT_PLAYLISTS_PAGE_SIZE, DEFAULT_TRACKS_PAGE_SIZE, SpotifyApi};
pub use error::{Error, Result};
pub use models::{
    Album, Artist, CurrentlyPlaying, Image, Page, Playlist, PlaylistItem, Track, TrackCount,
    UserProfile,
};
