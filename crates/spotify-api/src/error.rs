//! Error types for Web API calls

/// Errors from the typed API facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The endpoint answered with a non-success status.
    #[error("request to {endpoint} failed with status {status}")]
    Request { endpoint: String, status: u16 },

    #[error(transparent)]
    Auth(#[from] spotify_auth::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl Error {
    /// Whether the failure means the user has to log in again.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::Auth(
                spotify_auth::Error::NotAuthenticated
                    | spotify_auth::Error::RefreshFailed(_)
                    | spotify_auth::Error::SessionParse(_)
            ) | Error::Request { status: 401, .. }
        )
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_names_endpoint_and_status() {
        let err = Error::Request {
            endpoint: "me/playlists".into(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "request to me/playlists failed with status 503"
        );
        assert!(!err.is_auth());
    }

    #[test]
    fn auth_errors_are_classified() {
        assert!(Error::from(spotify_auth::Error::NotAuthenticated).is_auth());
        assert!(
            Error::Request {
                endpoint: "me".into(),
                status: 401
            }
            .is_auth()
        );
        assert!(!Error::Http("connection reset".into()).is_auth());
    }
}
