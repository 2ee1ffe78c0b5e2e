//! Error types for OAuth authentication operations

/// Errors from the PKCE flow, token lifecycle and session storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("authorization state mismatch, login must be restarted")]
    StateMismatch,

    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("no PKCE verifier stored for this login attempt")]
    MissingVerifier,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session storage error: {0}")]
    Storage(String),

    #[error("session parse error: {0}")]
    SessionParse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
