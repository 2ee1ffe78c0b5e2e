//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier, the S256 challenge and the anti-CSRF state
//! used during the authorization flow. The verifier stays in the session
//! store and is sent during token exchange; the challenge goes out in the
//! authorization URL so the provider can check that the exchange request
//! came from the party that started the login.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// RFC 7636 section 4.1 unreserved characters.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Verifier length; RFC 7636 allows 43 to 128 characters.
pub const VERIFIER_LEN: usize = 128;

const STATE_LEN: usize = 16;

/// Generate a cryptographically random PKCE code verifier.
///
/// 128 characters drawn uniformly from the unreserved set, the maximum
/// length RFC 7636 permits.
pub fn generate_verifier() -> String {
    random_string(VERIFIER_LEN, UNRESERVED)
}

/// Generate the opaque anti-CSRF `state` value for one login attempt.
pub fn generate_state() -> String {
    random_string(STATE_LEN, ALPHANUMERIC)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))` with no padding.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the full authorization URL with all required OAuth parameters.
pub fn build_authorization_url(
    config: &OAuthConfig,
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url> {
    Url::parse_with_params(
        &config.authorize_endpoint(),
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("code_challenge_method", "S256"),
            ("code_challenge", challenge),
            ("state", state),
            ("scope", config.scopes.as_str()),
        ],
    )
    .map_err(|e| Error::InvalidRequest(format!("invalid authorize endpoint: {e}")))
}

/// Draw `len` characters from `charset` using rejection sampling so every
/// character is equally likely.
fn random_string(len: usize, charset: &[u8]) -> String {
    let limit = 256 - (256 % charset.len());
    let mut rng = rand::rng();
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        rng.fill(&mut buf);
        for &b in &buf {
            if out.len() == len {
                break;
            }
            if usize::from(b) < limit {
                out.push(char::from(charset[usize::from(b) % charset.len()]));
            }
        }
    }
    out
}
