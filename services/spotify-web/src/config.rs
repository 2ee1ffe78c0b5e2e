//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. A missing config
//! file is not an error; every section has defaults and only the client ID
//! must be supplied (file or `SPOTIFY_CLIENT_ID`).

use serde::Deserialize;
use spotify_api::{DEFAULT_PLAYLISTS_PAGE_SIZE, DEFAULT_TRACKS_PAGE_SIZE};
use spotify_auth::{DEFAULT_ACCOUNTS_URL, DEFAULT_API_URL};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

/// Registered application and provider endpoints
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_playlists_page_size")]
    pub playlists_page_size: u32,
    #[serde(default = "default_tracks_page_size")]
    pub tracks_page_size: u32,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Origin the browser uses to reach the service, when it differs from
    /// the Host header (e.g. behind a reverse proxy). Must not carry a path:
    /// every route is served from the root. The redirect URI is derived from
    /// it and must be allow-listed with the provider.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Session persistence
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Session file; sessions are kept in memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Now-playing poller settings
#[derive(Debug, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_accounts_url() -> String {
    DEFAULT_ACCOUNTS_URL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_playlists_page_size() -> u32 {
    DEFAULT_PLAYLISTS_PAGE_SIZE
}

fn default_tracks_page_size() -> u32 {
    DEFAULT_TRACKS_PAGE_SIZE
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8888))
}

fn default_max_connections() -> usize {
    64
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            accounts_url: default_accounts_url(),
            api_url: default_api_url(),
            playlists_page_size: default_playlists_page_size(),
            tracks_page_size: default_tracks_page_size(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file (if present), then overlay
    /// environment variables and validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };

        if let Ok(client_id) = std::env::var("SPOTIFY_CLIENT_ID") {
            config.spotify.client_id = client_id.trim().to_owned();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.spotify.client_id.is_empty() {
            return Err(common::Error::Config(
                "spotify.client_id is required (or set SPOTIFY_CLIENT_ID)".into(),
            ));
        }

        let mut urls = vec![
            ("spotify.accounts_url", self.spotify.accounts_url.as_str()),
            ("spotify.api_url", self.spotify.api_url.as_str()),
        ];
        if let Some(public_url) = &self.server.public_url {
            urls.push(("server.public_url", public_url.as_str()));
        }
        for (name, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }
        if let Some(public_url) = &self.server.public_url {
            let parsed = reqwest::Url::parse(public_url).map_err(|e| {
                common::Error::Config(format!("server.public_url is not a valid URL: {e}"))
            })?;
            if parsed.path() != "/" || parsed.query().is_some() {
                return Err(common::Error::Config(format!(
                    "server.public_url must be an origin without a path, got: {public_url}"
                )));
            }
        }

        if !(1..=50).contains(&self.spotify.playlists_page_size) {
            return Err(common::Error::Config(
                "playlists_page_size must be between 1 and 50".into(),
            ));
        }
        if !(1..=100).contains(&self.spotify.tracks_page_size) {
            return Err(common::Error::Config(
                "tracks_page_size must be between 1 and 100".into(),
            ));
        }
        if self.poller.interval_secs == 0 {
            return Err(common::Error::Config(
                "interval_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("spotify-web.toml")
    }
}
