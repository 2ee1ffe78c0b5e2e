//! Spotify OAuth constants
//!
//! Endpoint defaults and the fixed storage keys used for the persisted
//! session and the transient PKCE values. None of these are secrets.

/// Accounts service hosting the authorize and token endpoints
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Base URL of the Web API resource endpoints
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Scopes needed to read the profile, playlists and playback state and to
/// issue transport commands.
pub const SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-read-currently-playing",
    "user-modify-playback-state",
    "playlist-read-private",
    "user-read-private",
];

/// Storage key of the persisted session record
pub const SESSION_STORAGE_KEY: &str = "spotify_auth";

/// Storage key of the PKCE verifier for an in-flight login
pub const PKCE_VERIFIER_KEY: &str = "pkce_verifier";

/// Storage key of the anti-CSRF state for an in-flight login
pub const PKCE_STATE_KEY: &str = "pkce_state";

/// Refresh the access token when it expires within this window.
pub const REFRESH_MARGIN_MILLIS: u64 = 60_000;
