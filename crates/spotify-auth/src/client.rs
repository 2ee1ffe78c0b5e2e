//! PKCE auth client
//!
//! Drives the whole authorization-code-with-PKCE handshake and owns the
//! token lifecycle afterwards. All durable state goes through the injected
//! [`SessionStore`]; the user agent is reached only through a [`Navigator`].
//!
//! States:
//! - `LoggedOut` → `PendingCallback` (`initiate_login` stored verifier + state)
//! - `PendingCallback` → `LoggedIn` (`handle_callback` exchanged the code)
//! - `LoggedIn` → `LoggedIn` (refresh inside the 60s margin or after a 401)
//! - any failed exchange or refresh → `LoggedOut`

use std::sync::Arc;

use common::Secret;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::OAuthConfig;
use crate::constants::{PKCE_STATE_KEY, PKCE_VERIFIER_KEY, SESSION_STORAGE_KEY};
use crate::error::{Error, Result};
use crate::navigator::{Navigator, redirect_uri_for, strip_callback_params};
use crate::pkce;
use crate::session::Session;
use crate::store::SessionStore;
use crate::token;

/// Where the client is in the login flow, derived from stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    PendingCallback,
    LoggedIn,
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::LoggedOut => "logged_out",
            AuthState::PendingCallback => "pending_callback",
            AuthState::LoggedIn => "logged_in",
        }
    }
}

pub struct AuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    /// Serializes refreshes; the poller and page handlers share one session.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, config: OAuthConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            http,
            config,
            store,
            clock: Arc::new(SystemClock),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the wall clock used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The HTTP client resource requests should be built with.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Start a login: store a fresh verifier and state, then send the user
    /// agent to the authorize endpoint.
    pub async fn initiate_login(&self, navigator: &dyn Navigator) -> Result<()> {
        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);
        let state = pkce::generate_state();
        let redirect_uri = redirect_uri_for(&navigator.location());

        let url = pkce::build_authorization_url(&self.config, &redirect_uri, &state, &challenge)?;

        self.store.set(PKCE_VERIFIER_KEY, verifier).await?;
        self.store.set(PKCE_STATE_KEY, state).await?;

        info!(redirect_uri = %redirect_uri, "redirecting to authorize endpoint");
        navigator.assign(url);
        Ok(())
    }

    /// Complete a login if the current location carries callback parameters.
    ///
    /// Returns `Ok(false)` when there is nothing to handle. The callback
    /// parameters are stripped from the location before anything else, so a
    /// failed attempt cannot be replayed by reloading the page.
    pub async fn handle_callback(&self, navigator: &dyn Navigator) -> Result<bool> {
        let location = navigator.location();
        let mut code = None;
        let mut returned_state = None;
        let mut provider_error = None;
        for (key, value) in location.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => returned_state = Some(value.into_owned()),
                "error" => provider_error = Some(value.into_owned()),
                _ => {}
            }
        }

        if code.is_none() && provider_error.is_none() {
            return Ok(false);
        }

        navigator.replace(strip_callback_params(&location));

        if let Some(reason) = provider_error {
            warn!(reason = %reason, "provider denied authorization");
            self.discard_pkce().await?;
            return Err(Error::AuthorizationDenied(reason));
        }
        let Some(code) = code else {
            return Ok(false);
        };

        let stored_state = self.store.get(PKCE_STATE_KEY).await?;
        let state_matches = matches!(
            (&returned_state, &stored_state),
            (Some(returned), Some(stored)) if returned == stored
        );
        if !state_matches {
            warn!("callback state does not match stored state, rejecting");
            self.discard_pkce().await?;
            return Err(Error::StateMismatch);
        }

        let Some(verifier) = self.store.get(PKCE_VERIFIER_KEY).await? else {
            self.discard_pkce().await?;
            return Err(Error::MissingVerifier);
        };

        let redirect_uri = redirect_uri_for(&location);
        let exchanged =
            token::exchange_code(&self.http, &self.config, &code, &verifier, &redirect_uri).await;
        self.discard_pkce().await?;

        let token = match exchanged {
            Ok(token) => token,
            Err(Error::Http(msg)) => return Err(Error::TokenExchange(msg)),
            Err(e) => return Err(e),
        };

        let session = Session::from_exchange(token, self.clock.now_millis());
        self.save_session(&session).await?;
        info!(expires_at = session.expires_at, "login completed");
        Ok(true)
    }

    /// Make sure a usable access token is stored.
    ///
    /// Returns `false` if nobody is logged in. Refreshes first when the
    /// token expires within the refresh margin.
    pub async fn ensure_valid_session(&self) -> Result<bool> {
        let Some(session) = self.load_session().await? else {
            return Ok(false);
        };
        if session.needs_refresh(self.clock.now_millis()) {
            debug!(expires_at = session.expires_at, "access token near expiry, refreshing");
            self.refresh(session).await?;
        }
        Ok(true)
    }

    /// Send `request` with the current bearer token.
    ///
    /// A 401 triggers exactly one refresh and one retry with the new token;
    /// whatever the retry returns is handed back to the caller.
    pub async fn authorized_fetch(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        if !self.ensure_valid_session().await? {
            return Err(Error::NotAuthenticated);
        }
        let session = self.load_session().await?.ok_or(Error::NotAuthenticated)?;

        let retry = request.try_clone();
        let response = self.send_with_token(request, &session.access_token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(retry) = retry else {
            warn!("401 on a request with a streaming body, not retrying");
            return Ok(response);
        };

        info!(url = %retry.url(), "resource endpoint returned 401, refreshing and retrying once");
        let session = self.refresh(session).await?;
        self.send_with_token(retry, &session.access_token).await
    }

    /// Forget the session. Tokens are not revoked at the provider.
    pub async fn logout(&self) -> Result<()> {
        self.store.remove(SESSION_STORAGE_KEY).await?;
        info!("logged out");
        Ok(())
    }

    /// Whether a session with an access token is stored.
    pub async fn is_authenticated(&self) -> bool {
        match self.load_session().await {
            Ok(Some(session)) => !session.access_token.expose().is_empty(),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to read session");
                false
            }
        }
    }

    pub async fn auth_state(&self) -> AuthState {
        if self.is_authenticated().await {
            return AuthState::LoggedIn;
        }
        match self.store.get(PKCE_VERIFIER_KEY).await {
            Ok(Some(_)) => AuthState::PendingCallback,
            _ => AuthState::LoggedOut,
        }
    }

    /// Exchange the stored refresh token; any failure logs the user out.
    ///
    /// `current` is the session the caller saw. If another refresh replaced
    /// it while this one waited for the lock, the stored session is returned
    /// and the (possibly already rotated) refresh token is not reused.
    async fn refresh(&self, current: Session) -> Result<Session> {
        let _guard = self.refresh_lock.lock().await;
        let Some(stored) = self.load_session().await? else {
            return Err(Error::NotAuthenticated);
        };
        if stored.access_token != current.access_token {
            debug!("session already refreshed by a concurrent caller");
            return Ok(stored);
        }

        let Some(refresh) = stored.refresh_token.as_ref() else {
            self.fail_refresh("no refresh token available").await?;
            return Err(Error::RefreshFailed("no refresh token available".into()));
        };

        match token::refresh_token(&self.http, &self.config, refresh.expose()).await {
            Ok(token) => {
                let session = stored.refreshed(token, self.clock.now_millis());
                self.save_session(&session).await?;
                metrics::counter!("spotify_token_refresh_total", "outcome" => "ok").increment(1);
                info!(expires_at = session.expires_at, "access token refreshed");
                Ok(session)
            }
            Err(e) => {
                self.fail_refresh(&e.to_string()).await?;
                Err(match e {
                    Error::Http(msg) => Error::RefreshFailed(msg),
                    other => other,
                })
            }
        }
    }

    async fn fail_refresh(&self, reason: &str) -> Result<()> {
        metrics::counter!("spotify_token_refresh_total", "outcome" => "failed").increment(1);
        warn!(reason, "token refresh failed, clearing session");
        self.store.remove(SESSION_STORAGE_KEY).await
    }

    async fn send_with_token(
        &self,
        mut request: reqwest::Request,
        token: &Secret<String>,
    ) -> Result<reqwest::Response> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|e| Error::InvalidRequest(format!("invalid token value: {e}")))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        self.http
            .execute(request)
            .await
            .map_err(|e| Error::Http(format!("resource request failed: {e}")))
    }

    async fn load_session(&self) -> Result<Option<Session>> {
        let Some(raw) = self.store.get(SESSION_STORAGE_KEY).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::SessionParse(format!("parsing stored session: {e}")))
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)
            .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;
        self.store.set(SESSION_STORAGE_KEY, raw).await
    }

    async fn discard_pkce(&self) -> Result<()> {
        self.store.remove(PKCE_VERIFIER_KEY).await?;
        self.store.remove(PKCE_STATE_KEY).await
    }
}
