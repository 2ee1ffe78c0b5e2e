//! OAuth client settings

use crate::constants::{DEFAULT_ACCOUNTS_URL, SCOPES};

/// Public client settings for the authorization-code-with-PKCE flow.
///
/// PKCE clients have no client secret; `client_id` identifies the
/// registered application and is sent on every token request.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Base URL of the accounts service (no trailing slash required)
    pub accounts_url: String,
    /// Space-joined scope list sent to the authorize endpoint
    pub scopes: String,
}

impl OAuthConfig {
    /// Settings for `client_id` against the production accounts service.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            scopes: SCOPES.join(" "),
        }
    }

    /// Point the client at a different accounts service (used by tests).
    pub fn with_accounts_url(mut self, url: impl Into<String>) -> Self {
        self.accounts_url = url.into();
        self
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.accounts_url.trim_end_matches('/'))
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/api/token", self.accounts_url.trim_end_matches('/'))
    }
}
