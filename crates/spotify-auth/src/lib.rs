//! Spotify OAuth authentication library
//!
//! Implements the authorization-code-with-PKCE flow for a public client and
//! the token lifecycle that follows it. Everything environment-specific is
//! injected: persistence (`SessionStore`), the user agent (`Navigator`) and
//! time (`Clock`), so the whole flow runs against fakes in tests.
//!
//! Login flow:
//! 1. `AuthClient::initiate_login()` stores a verifier + state and redirects
//!    to the authorize URL built by `pkce::build_authorization_url()`
//! 2. The provider redirects back with `code` and `state`
//! 3. `AuthClient::handle_callback()` checks the state and calls
//!    `token::exchange_code()`, storing the resulting `Session`
//! 4. `AuthClient::authorized_fetch()` refreshes near expiry and retries a
//!    401 once via `token::refresh_token()`

pub mod client;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod navigator;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;

pub use client::{AuthClient, AuthState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::OAuthConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use navigator::{Navigation, Navigator, PageNavigator, redirect_uri_for};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use session::Session;
pub use store::{FileStore, MemoryStore, SessionStore};
pub use token::{TokenResponse, exchange_code, refresh_token};
