//! Web API endpoint wrappers

use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use spotify_auth::AuthClient;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::models::{CurrentlyPlaying, Page, Playlist, PlaylistItem, UserProfile};

/// Page size for the playlist list (the endpoint maximum).
pub const DEFAULT_PLAYLISTS_PAGE_SIZE: u32 = 50;

/// Page size for a playlist's tracks (the endpoint maximum).
pub const DEFAULT_TRACKS_PAGE_SIZE: u32 = 100;

/// Typed access to the endpoints the client renders.
pub struct SpotifyApi {
    auth: Arc<AuthClient>,
    base_url: String,
    playlists_page_size: u32,
    tracks_page_size: u32,
}

impl SpotifyApi {
    pub fn new(auth: Arc<AuthClient>, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            base_url: base_url.into(),
            playlists_page_size: DEFAULT_PLAYLISTS_PAGE_SIZE,
            tracks_page_size: DEFAULT_TRACKS_PAGE_SIZE,
        }
    }

    pub fn with_page_sizes(mut self, playlists: u32, tracks: u32) -> Self {
        self.playlists_page_size = playlists;
        self.tracks_page_size = tracks;
        self
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// `GET /me`
    pub async fn current_user(&self) -> Result<UserProfile> {
        let url = self.url(&["me"], &[])?;
        self.get_json("me", url).await
    }

    /// `GET /me/playlists`, first page.
    pub async fn current_user_playlists(&self) -> Result<Page<Playlist>> {
        let limit = self.playlists_page_size.to_string();
        let url = self.url(&["me", "playlists"], &[("limit", &limit)])?;
        self.get_json("me/playlists", url).await
    }

    /// `GET /playlists/{id}/tracks`, first page.
    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Page<PlaylistItem>> {
        let limit = self.tracks_page_size.to_string();
        let url = self.url(&["playlists", playlist_id, "tracks"], &[("limit", &limit)])?;
        self.get_json("playlists/{id}/tracks", url).await
    }

    /// `GET /me/player/currently-playing`
    ///
    /// `Ok(None)` means nothing is playing: the endpoint answers 204 with no
    /// body, which is not an error and is never parsed.
    #[instrument(skip(self))]
    pub async fn current_playback(&self) -> Result<Option<CurrentlyPlaying>> {
        const ENDPOINT: &str = "me/player/currently-playing";
        let url = self.url(&["me", "player", "currently-playing"], &[])?;
        let response = self.send(ENDPOINT, Method::GET, url, None).await?;

        if response.status() == StatusCode::NO_CONTENT {
            debug!("nothing playing");
            return Ok(None);
        }
        decode(ENDPOINT, response).await.map(Some)
    }

    /// `PUT /me/player/play` resuming the current context.
    pub async fn play(&self) -> Result<()> {
        let url = self.url(&["me", "player", "play"], &[])?;
        self.send("me/player/play", Method::PUT, url, Some(serde_json::json!({})))
            .await
            .map(drop)
    }

    /// `PUT /me/player/pause`
    pub async fn pause(&self) -> Result<()> {
        let url = self.url(&["me", "player", "pause"], &[])?;
        self.send("me/player/pause", Method::PUT, url, None)
            .await
            .map(drop)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, url: Url) -> Result<T> {
        let response = self.send(endpoint, Method::GET, url, None).await?;
        decode(endpoint, response).await
    }

    /// Send through the auth client; non-2xx becomes `Error::Request`.
    async fn send(
        &self,
        endpoint: &str,
        method: Method,
        url: Url,
        json: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let builder = self.auth.http_client().request(method.clone(), url);
        let builder = match json {
            Some(body) => builder.json(&body),
            // Spotify rejects body-less PUTs without Content-Length
            None if method == Method::PUT => builder.body(""),
            None => builder,
        };
        let request = builder
            .build()
            .map_err(|e| Error::Http(format!("building {endpoint} request: {e}")))?;

        let response = self.auth.authorized_fetch(request).await?;
        let status = response.status();
        metrics::counter!(
            "spotify_api_requests_total",
            "endpoint" => endpoint.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        if !status.is_success() {
            return Err(Error::Request {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Http(format!("invalid API base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Http(format!("API base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> Result<T> {
    response.json::<T>().await.map_err(|e| Error::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}
