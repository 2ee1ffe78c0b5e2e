//! The persisted session record
//!
//! `expires_at` is a unix timestamp in milliseconds (absolute, not a delta),
//! computed at storage time from `TokenResponse.expires_in` plus the current
//! time.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::REFRESH_MARGIN_MILLIS;
use crate::token::TokenResponse;

/// Tokens for the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for resource calls
    pub access_token: Secret<String>,
    /// Refresh token; absent only if the provider never issued one
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
}

impl Session {
    /// Build the session from a code-exchange response.
    pub fn from_exchange(token: TokenResponse, now_millis: u64) -> Self {
        Self {
            access_token: Secret::new(token.access_token),
            refresh_token: token.refresh_token.map(Secret::new),
            expires_at: expiry(now_millis, token.expires_in),
        }
    }

    /// Apply a refresh response, keeping the previous refresh token when the
    /// provider does not rotate it.
    pub fn refreshed(&self, token: TokenResponse, now_millis: u64) -> Self {
        Self {
            access_token: Secret::new(token.access_token),
            refresh_token: token
                .refresh_token
                .map(Secret::new)
                .or_else(|| self.refresh_token.clone()),
            expires_at: expiry(now_millis, token.expires_in),
        }
    }

    /// Whether the access token is inside the refresh margin (or expired).
    pub fn needs_refresh(&self, now_millis: u64) -> bool {
        now_millis > self.expires_at.saturating_sub(REFRESH_MARGIN_MILLIS)
    }
}

fn expiry(now_millis: u64, expires_in_secs: u64) -> u64 {
    now_millis.saturating_add(expires_in_secs.saturating_mul(1000))
}
