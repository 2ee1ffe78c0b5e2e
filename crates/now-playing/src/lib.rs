//! Background "now playing" poller
//!
//! Keeps a snapshot of the user's playback fresh without user action. The
//! poller fetches on a fixed interval, skips ticks while the page is hidden,
//! refreshes immediately when it becomes visible again, and publishes each
//! result on a `watch` channel the view reads from.
//!
//! Lifecycle:
//! 1. View enters the logged-in state → `PlaybackPoller::start()`
//! 2. Each tick → `PlaybackSource::current_playback()` → `NowPlaying` published
//! 3. Page hidden → ticks skipped; page visible → one immediate fetch
//! 4. Logout → `PlaybackPoller::stop()`

pub mod poller;
pub mod source;
pub mod visibility;

pub use poller::{DEFAULT_POLL_INTERVAL, NowPlaying, PlaybackPoller};
pub use source::PlaybackSource;
pub use visibility::VisibilitySignal;
