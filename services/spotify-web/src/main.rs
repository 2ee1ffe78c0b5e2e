//! Spotify web view
//!
//! Single-binary Rust service that:
//! 1. Runs the Spotify authorization-code-with-PKCE login for a public client
//! 2. Renders the user's profile, playlists and tracks as HTML
//! 3. Keeps a now-playing fragment fresh with a background poller
//! 4. Forwards play/pause commands to the Web API

mod config;
mod metrics;
mod routes;
mod views;

use anyhow::{Context, Result};
use now_playing::{PlaybackPoller, PlaybackSource, VisibilitySignal};
use reqwest::Url;
use spotify_api::SpotifyApi;
use spotify_auth::{AuthClient, FileStore, MemoryStore, OAuthConfig, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting spotify-web");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder().context("failed to install metrics recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        accounts_url = %config.spotify.accounts_url,
        api_url = %config.spotify.api_url,
        persistent_sessions = config.storage.path.is_some(),
        "configuration loaded"
    );

    let store: Arc<dyn SessionStore> = match &config.storage.path {
        Some(path) => Arc::new(
            FileStore::load(path.clone())
                .await
                .with_context(|| format!("failed to open session store {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let oauth = OAuthConfig::new(config.spotify.client_id.clone())
        .with_accounts_url(config.spotify.accounts_url.clone());
    let auth = Arc::new(AuthClient::new(reqwest::Client::new(), oauth, store));

    let api = Arc::new(
        SpotifyApi::new(auth, config.spotify.api_url.clone()).with_page_sizes(
            config.spotify.playlists_page_size,
            config.spotify.tracks_page_size,
        ),
    );

    let source: Arc<dyn PlaybackSource> = api.clone();
    let poller = Arc::new(PlaybackPoller::new(
        source,
        Duration::from_secs(config.poller.interval_secs),
        VisibilitySignal::default(),
    ));

    let public_url = config
        .server
        .public_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("server.public_url is not a valid URL")?;

    let app_state = AppState {
        api,
        poller: poller.clone(),
        prometheus,
        public_url,
        refresh_secs: config.poller.interval_secs,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    poller.stop();
    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
