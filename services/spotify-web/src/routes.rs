//! HTTP routes for the single-page view
//!
//! Each request builds a `PageNavigator` for the URL the browser asked for.
//! Navigations the auth client requests become redirects: `assign` leaves
//! for the authorize endpoint, `replace` rewrites the current URL (dropping
//! the callback parameters).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Form, Path, Request, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use now_playing::{NowPlaying, PlaybackPoller};
use reqwest::Url;
use serde::Deserialize;
use spotify_api::SpotifyApi;
use spotify_auth::{Navigation, PageNavigator};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::views;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<SpotifyApi>,
    pub poller: Arc<PlaybackPoller>,
    pub prometheus: PrometheusHandle,
    /// Externally visible origin; the Host header is used when unset
    pub public_url: Option<Url>,
    /// Client-side refresh period of the now-playing fragment
    pub refresh_secs: u64,
}

impl AppState {
    /// The URL the browser is on for this request.
    fn location(&self, headers: &HeaderMap, uri: &Uri) -> Option<Url> {
        let base = match &self.public_url {
            Some(url) => url.clone(),
            None => {
                let host = headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("localhost");
                Url::parse(&format!("http://{host}/")).ok()?
            }
        };
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        base.join(path).ok()
    }
}

/// Build the axum router with all routes and shared state.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/playlists/{id}", get(playlist_handler))
        .route("/player/play", post(play_handler))
        .route("/player/pause", post(pause_handler))
        .route("/now-playing", get(now_playing_handler))
        .route("/visibility", post(visibility_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(trace_request))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Run each request in a span carrying a fresh request id and record it.
async fn trace_request(request: Request, next: Next) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let method = request.method().clone();
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
    );
    let started = Instant::now();
    let response = next.run(request).instrument(span).await;
    crate::metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Redirect within this service, keeping only path and query.
fn redirect_local(url: &Url) -> Response {
    let target = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    Redirect::to(&target).into_response()
}

fn bad_location() -> Response {
    (StatusCode::BAD_REQUEST, "invalid request location").into_response()
}

/// Landing page. Completes a pending login first, then renders whichever
/// view the auth state calls for.
async fn index_handler(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Response {
    let Some(location) = state.location(&headers, &uri) else {
        return bad_location();
    };
    let navigator = PageNavigator::new(location);
    if let Err(e) = state.api.auth().handle_callback(&navigator).await {
        warn!(error = %e, "login callback failed");
    }
    if let Some(Navigation::Replace(url)) = navigator.take_navigation() {
        return redirect_local(&url);
    }
    render_home(&state).await
}

async fn render_home(state: &AppState) -> Response {
    let api = &state.api;
    if !api.auth().is_authenticated().await {
        state.poller.stop();
        return Html(views::logged_out(None)).into_response();
    }

    let profile = match api.current_user().await {
        Ok(profile) => profile,
        Err(e) => return load_failed(state, e),
    };
    let playlists = match api.current_user_playlists().await {
        Ok(playlists) => playlists,
        Err(e) => return load_failed(state, e),
    };

    let mut now_playing = state.poller.latest();
    if matches!(now_playing, NowPlaying::Unknown) {
        now_playing = match api.current_playback().await {
            Ok(Some(current)) => NowPlaying::Playing(current),
            Ok(None) => NowPlaying::Nothing,
            Err(e) => {
                warn!(error = %e, "failed to fetch current playback");
                NowPlaying::Unknown
            }
        };
    }
    if !state.poller.is_running() {
        state.poller.start();
    }

    Html(views::dashboard(
        &profile,
        &playlists,
        &now_playing,
        state.refresh_secs,
    ))
    .into_response()
}

/// Profile and playlist failures fall back to the logged-out view.
fn load_failed(state: &AppState, e: spotify_api::Error) -> Response {
    warn!(error = %e, auth = e.is_auth(), "failed to load account data");
    state.poller.stop();
    Html(views::logged_out(Some(
        "Could not load your Spotify account. Please log in again.",
    )))
    .into_response()
}

async fn login_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(location) = state.location(&headers, &Uri::from_static("/")) else {
        return bad_location();
    };
    let navigator = PageNavigator::new(location);
    if let Err(e) = state.api.auth().initiate_login(&navigator).await {
        error!(error = %e, "failed to start login");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(views::logged_out(Some("Could not start the login."))),
        )
            .into_response();
    }
    match navigator.take_navigation() {
        Some(Navigation::Assign(url)) => Redirect::to(url.as_str()).into_response(),
        other => {
            error!(?other, "login did not request a navigation");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout_handler(State(state): State<AppState>) -> Response {
    state.poller.stop();
    if let Err(e) = state.api.auth().logout().await {
        error!(error = %e, "failed to clear session");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Redirect::to("/").into_response()
}

async fn playlist_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let api = &state.api;
    if !api.auth().is_authenticated().await {
        return Redirect::to("/").into_response();
    }
    let profile = match api.current_user().await {
        Ok(profile) => profile,
        Err(e) => return load_failed(&state, e),
    };
    match api.playlist_tracks(&id).await {
        Ok(items) => Html(views::tracks(&profile, &items)).into_response(),
        Err(e) => load_failed(&state, e),
    }
}

async fn play_handler(State(state): State<AppState>) -> Response {
    if let Err(e) = state.api.play().await {
        warn!(error = %e, "play command failed");
    }
    Redirect::to("/").into_response()
}

async fn pause_handler(State(state): State<AppState>) -> Response {
    if let Err(e) = state.api.pause().await {
        warn!(error = %e, "pause command failed");
    }
    Redirect::to("/").into_response()
}

/// Latest poller snapshot as an HTML fragment.
async fn now_playing_handler(State(state): State<AppState>) -> impl IntoResponse {
    Html(views::now_playing_fragment(&state.poller.latest()))
}

#[derive(Deserialize)]
struct VisibilityForm {
    visible: bool,
}

/// Upper bound on how long a reveal waits for the forced playback refresh.
const REVEAL_REFRESH_WAIT: Duration = Duration::from_secs(2);

/// Record the page's visibility. When a hidden page is shown again the
/// response waits for the poller's immediate refresh, so the fragment the
/// page fetches next is already current.
async fn visibility_handler(
    State(state): State<AppState>,
    Form(form): Form<VisibilityForm>,
) -> StatusCode {
    let visibility = state.poller.visibility();
    let revealed = form.visible && !visibility.is_visible() && state.poller.is_running();
    let mut snapshot = state.poller.subscribe();
    visibility.set_visible(form.visible);

    if revealed
        && tokio::time::timeout(REVEAL_REFRESH_WAIT, snapshot.changed())
            .await
            .is_err()
    {
        debug!("no playback snapshot before visibility response");
    }
    StatusCode::NO_CONTENT
}

/// Health endpoint: JSON with the auth state and whether polling is active.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "auth": state.api.auth().auth_state().await.label(),
        "poller_running": state.poller.is_running(),
    });
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::Request;
    use axum::http::header::LOCATION;
    use axum::routing::put;
    use common::Secret;
    use now_playing::{PlaybackSource, VisibilitySignal};
    use spotify_auth::{
        AuthClient, MemoryStore, OAuthConfig, PKCE_STATE_KEY, PKCE_VERIFIER_KEY,
        SESSION_STORAGE_KEY, Session, SessionStore,
    };
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    /// Mock accounts service and Web API on one listener.
    #[derive(Clone, Default)]
    struct Mock {
        token_calls: Arc<AtomicUsize>,
        play_calls: Arc<AtomicUsize>,
        fail_profile: Arc<AtomicBool>,
        token_form: Arc<Mutex<Option<String>>>,
    }

    async fn start_mock() -> (Mock, String) {
        let mock = Mock::default();
        let app = axum::Router::new()
            .route(
                "/api/token",
                post(|State(mock): State<Mock>, body: String| async move {
                    mock.token_calls.fetch_add(1, Ordering::SeqCst);
                    *mock.token_form.lock().unwrap() = Some(body);
                    axum::Json(serde_json::json!({
                        "access_token": "at_new",
                        "refresh_token": "rt_new",
                        "expires_in": 3600,
                    }))
                }),
            )
            .route(
                "/v1/me",
                get(|State(mock): State<Mock>| async move {
                    if mock.fail_profile.load(Ordering::SeqCst) {
                        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
                    }
                    (
                        StatusCode::OK,
                        r#"{"id":"wizzler","display_name":"Wiz <&>","images":[]}"#.to_string(),
                    )
                }),
            )
            .route(
                "/v1/me/playlists",
                get(|| async {
                    r#"{"items":[{"id":"p1","name":"Road Trip","tracks":{"total":3}}],"next":null}"#
                }),
            )
            .route(
                "/v1/playlists/{id}/tracks",
                get(|Path(id): Path<String>| async move {
                    format!(
                        r#"{{"items":[{{"track":{{"name":"{id} opener","artists":[{{"name":"Band"}}]}}}}],"next":null}}"#
                    )
                }),
            )
            .route(
                "/v1/me/player/currently-playing",
                get(|| async { StatusCode::NO_CONTENT }),
            )
            .route(
                "/v1/me/player/play",
                put(|State(mock): State<Mock>| async move {
                    mock.play_calls.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }),
            )
            .route(
                "/v1/me/player/pause",
                put(|| async { StatusCode::NOT_FOUND }),
            )
            .with_state(mock.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (mock, format!("http://{addr}"))
    }

    struct Harness {
        mock: Mock,
        store: Arc<MemoryStore>,
        state: AppState,
        accounts_url: String,
    }

    impl Harness {
        async fn new() -> Self {
            let (mock, base) = start_mock().await;
            let store = Arc::new(MemoryStore::new());
            let auth = AuthClient::new(
                reqwest::Client::new(),
                OAuthConfig::new("test-client").with_accounts_url(&base),
                store.clone(),
            );
            let api = Arc::new(SpotifyApi::new(Arc::new(auth), format!("{base}/v1")));
            let source: Arc<dyn PlaybackSource> = api.clone();
            let poller = Arc::new(PlaybackPoller::new(
                source,
                Duration::from_secs(10),
                VisibilitySignal::default(),
            ));
            let state = AppState {
                api,
                poller,
                prometheus: crate::metrics::test_handle(),
                public_url: None,
                refresh_secs: 10,
            };
            Self {
                mock,
                store,
                state,
                accounts_url: base,
            }
        }

        async fn log_in(&self) {
            let session = Session {
                access_token: Secret::new("at_test".to_string()),
                refresh_token: Some(Secret::new("rt_test".to_string())),
                expires_at: u64::MAX,
            };
            self.store
                .set(SESSION_STORAGE_KEY, serde_json::to_string(&session).unwrap())
                .await
                .unwrap();
        }

        async fn send(&self, method: &str, uri: &str, body: &str) -> Response {
            let mut request = Request::builder()
                .method(method)
                .uri(uri)
                .header(HOST, "127.0.0.1:8888");
            if !body.is_empty() {
                request = request.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            }
            build_router(self.state.clone(), 16)
                .oneshot(request.body(Body::from(body.to_string())).unwrap())
                .await
                .unwrap()
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn index_renders_logged_out_view() {
        let h = Harness::new().await;
        let response = h.send("GET", "/", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Login with Spotify"));
        assert!(html.contains("Please log in to see your playlists"));
        assert!(!h.state.poller.is_running());
    }

    #[tokio::test]
    async fn login_redirects_to_authorize_endpoint() {
        let h = Harness::new().await;
        let response = h.send("POST", "/login", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let target = Url::parse(location(&response)).unwrap();
        assert!(
            target
                .as_str()
                .starts_with(&format!("{}/authorize?", h.accounts_url))
        );
        let query: std::collections::HashMap<_, _> = target.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "test-client");
        assert_eq!(query["redirect_uri"], "http://127.0.0.1:8888/");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(
            query["state"],
            h.store.get(PKCE_STATE_KEY).await.unwrap().unwrap()
        );
        assert!(h.store.get(PKCE_VERIFIER_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn callback_completes_login_and_strips_params() {
        let h = Harness::new().await;
        h.store.set(PKCE_STATE_KEY, "st4te".into()).await.unwrap();
        h.store
            .set(PKCE_VERIFIER_KEY, "v".repeat(64))
            .await
            .unwrap();

        let response = h.send("GET", "/?code=abc&state=st4te&tab=1", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/?tab=1");

        assert!(h.state.api.auth().is_authenticated().await);
        assert_eq!(h.mock.token_calls.load(Ordering::SeqCst), 1);
        let form = h.mock.token_form.lock().unwrap().clone().unwrap();
        assert!(form.contains("grant_type=authorization_code"));
        assert!(form.contains("code=abc"));
        assert!(h.store.get(PKCE_VERIFIER_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn callback_with_wrong_state_stays_logged_out() {
        let h = Harness::new().await;
        h.store.set(PKCE_STATE_KEY, "expected".into()).await.unwrap();
        h.store.set(PKCE_VERIFIER_KEY, "v".repeat(64)).await.unwrap();

        let response = h.send("GET", "/?code=abc&state=forged", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert!(!h.state.api.auth().is_authenticated().await);
        assert_eq!(h.mock.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn index_renders_dashboard_and_starts_poller() {
        let h = Harness::new().await;
        h.log_in().await;

        let response = h.send("GET", "/", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Wiz &lt;&amp;&gt;"));
        assert!(html.contains(r#"href="/playlists/p1""#));
        assert!(html.contains("Road Trip (3)"));
        assert!(html.contains("Nothing is currently playing."));
        assert!(html.contains(r#"action="/logout""#));
        assert!(h.state.poller.is_running());
    }

    #[tokio::test]
    async fn profile_failure_falls_back_to_logged_out_view() {
        let h = Harness::new().await;
        h.log_in().await;
        h.mock.fail_profile.store(true, Ordering::SeqCst);

        let html = body_text(h.send("GET", "/", "").await).await;
        assert!(html.contains("Login with Spotify"));
        assert!(html.contains("Could not load your Spotify account"));
        assert!(!h.state.poller.is_running());
    }

    #[tokio::test]
    async fn playlist_page_lists_tracks() {
        let h = Harness::new().await;
        h.log_in().await;

        let response = h.send("GET", "/playlists/p1", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("p1 opener \u{2014} Band"));
        assert!(html.contains(r#"<a href="/">Back to playlists</a>"#));
    }

    #[tokio::test]
    async fn playlist_page_requires_login() {
        let h = Harness::new().await;
        let response = h.send("GET", "/playlists/p1", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn transport_commands_redirect_home() {
        let h = Harness::new().await;
        h.log_in().await;

        let response = h.send("POST", "/player/play", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(h.mock.play_calls.load(Ordering::SeqCst), 1);

        // 404 (no active device) is logged, not surfaced
        let response = h.send("POST", "/player/pause", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn logout_clears_session_and_stops_poller() {
        let h = Harness::new().await;
        h.log_in().await;
        h.send("GET", "/", "").await;
        assert!(h.state.poller.is_running());

        let response = h.send("POST", "/logout", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(!h.state.api.auth().is_authenticated().await);
        assert!(!h.state.poller.is_running());
        assert!(matches!(h.state.poller.latest(), NowPlaying::Unknown));
    }

    #[tokio::test]
    async fn visibility_updates_signal() {
        let h = Harness::new().await;
        let response = h.send("POST", "/visibility", "visible=false").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!h.state.poller.visibility().is_visible());

        h.send("POST", "/visibility", "visible=true").await;
        assert!(h.state.poller.visibility().is_visible());
    }

    #[tokio::test]
    async fn reveal_responds_after_playback_refresh() {
        let h = Harness::new().await;
        h.log_in().await;
        h.send("POST", "/visibility", "visible=false").await;
        h.state.poller.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(h.state.poller.latest(), NowPlaying::Unknown));

        let response = h.send("POST", "/visibility", "visible=true").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        // currently-playing answers 204, published as Nothing
        assert!(matches!(h.state.poller.latest(), NowPlaying::Nothing));

        let html = body_text(h.send("GET", "/now-playing", "").await).await;
        assert!(html.contains("Nothing is currently playing."));
    }

    #[tokio::test]
    async fn now_playing_fragment_reads_snapshot() {
        let h = Harness::new().await;
        let html = body_text(h.send("GET", "/now-playing", "").await).await;
        assert!(html.contains("Loading"));
    }

    #[tokio::test]
    async fn health_endpoint_reports_auth_state() {
        let h = Harness::new().await;
        let response = h.send("GET", "/health", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["auth"], "logged_out");
        assert_eq!(json["poller_running"], false);

        h.store.set(PKCE_VERIFIER_KEY, "v".into()).await.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&body_text(h.send("GET", "/health", "").await).await).unwrap();
        assert_eq!(json["auth"], "pending_callback");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let h = Harness::new().await;
        let response = h.send("GET", "/metrics", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn location_prefers_public_url_over_host_header() {
        let mut h = Harness::new().await;
        let uri: Uri = "/?code=x".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "127.0.0.1:8888".parse().unwrap());

        assert_eq!(
            h.state.location(&headers, &uri).unwrap().as_str(),
            "http://127.0.0.1:8888/?code=x"
        );

        h.state.public_url = Some(Url::parse("https://music.example.com/").unwrap());
        assert_eq!(
            h.state.location(&headers, &uri).unwrap().as_str(),
            "https://music.example.com/?code=x"
        );
    }
}
