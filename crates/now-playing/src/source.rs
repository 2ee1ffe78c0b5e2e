//! What the poller polls

use std::future::Future;
use std::pin::Pin;

use spotify_api::{CurrentlyPlaying, SpotifyApi};

/// Boxed future returned by [`PlaybackSource::current_playback`].
pub type PlaybackFuture<'a> =
    Pin<Box<dyn Future<Output = spotify_api::Result<Option<CurrentlyPlaying>>> + Send + 'a>>;

/// Anything that can report the current playback snapshot.
///
/// `Ok(None)` means nothing is playing.
pub trait PlaybackSource: Send + Sync + 'static {
    fn current_playback(&self) -> PlaybackFuture<'_>;
}

impl PlaybackSource for SpotifyApi {
    fn current_playback(&self) -> PlaybackFuture<'_> {
        Box::pin(SpotifyApi::current_playback(self))
    }
}
