//! Cancel-and-restart playback polling task
//!
//! At most one poll task exists per poller: `start` aborts the previous
//! task before spawning a new one. Fetch failures are logged and swallowed;
//! there is no backoff, the next tick simply tries again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spotify_api::CurrentlyPlaying;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::source::PlaybackSource;
use crate::visibility::VisibilitySignal;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Latest known playback state.
#[derive(Debug, Clone, Default)]
pub enum NowPlaying {
    /// No successful poll yet
    #[default]
    Unknown,
    /// The provider reported nothing playing
    Nothing,
    Playing(CurrentlyPlaying),
}

pub struct PlaybackPoller {
    source: Arc<dyn PlaybackSource>,
    interval: Duration,
    visibility: VisibilitySignal,
    snapshot: Arc<watch::Sender<NowPlaying>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackPoller {
    pub fn new(
        source: Arc<dyn PlaybackSource>,
        interval: Duration,
        visibility: VisibilitySignal,
    ) -> Self {
        let (snapshot, _) = watch::channel(NowPlaying::Unknown);
        Self {
            source,
            interval,
            visibility,
            snapshot: Arc::new(snapshot),
            task: Mutex::new(None),
        }
    }

    /// Start polling, replacing any running poll task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.lock_task();
        if let Some(previous) = task.take() {
            previous.abort();
            debug!("replaced running playback poller");
        }

        let source = self.source.clone();
        let snapshot = self.snapshot.clone();
        let visibility = self.visibility.subscribe();
        let interval = self.interval;
        *task = Some(tokio::spawn(run(source, interval, visibility, snapshot)));
        info!(interval_secs = interval.as_secs(), "playback poller started");
    }

    /// Stop polling and forget the last snapshot.
    pub fn stop(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
            info!("playback poller stopped");
        }
        self.snapshot.send_replace(NowPlaying::Unknown);
    }

    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn latest(&self) -> NowPlaying {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NowPlaying> {
        self.snapshot.subscribe()
    }

    pub fn visibility(&self) -> &VisibilitySignal {
        &self.visibility
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PlaybackPoller {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }
}

async fn run(
    source: Arc<dyn PlaybackSource>,
    interval: Duration,
    mut visibility: watch::Receiver<bool>,
    snapshot: Arc<watch::Sender<NowPlaying>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !*visibility.borrow() {
                    metrics::counter!("playback_poll_ticks_total", "outcome" => "skipped").increment(1);
                    debug!("page hidden, skipping playback poll");
                    continue;
                }
                poll_once(source.as_ref(), &snapshot).await;
            }
            changed = visibility.changed() => {
                if changed.is_err() {
                    debug!("visibility signal dropped, stopping playback poller");
                    return;
                }
                let visible = *visibility.borrow_and_update();
                if visible {
                    debug!("page visible again, refreshing playback now");
                    poll_once(source.as_ref(), &snapshot).await;
                    ticker.reset();
                }
            }
        }
    }
}

async fn poll_once(source: &dyn PlaybackSource, snapshot: &watch::Sender<NowPlaying>) {
    match source.current_playback().await {
        Ok(Some(now)) => {
            metrics::counter!("playback_poll_ticks_total", "outcome" => "ok").increment(1);
            snapshot.send_replace(NowPlaying::Playing(now));
        }
        Ok(None) => {
            metrics::counter!("playback_poll_ticks_total", "outcome" => "ok").increment(1);
            snapshot.send_replace(NowPlaying::Nothing);
        }
        Err(e) => {
            metrics::counter!("playback_poll_ticks_total", "outcome" => "error").increment(1);
            warn!(error = %e, "playback poll failed, will retry next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::source::PlaybackFuture;

    /// Counts calls; answers with a playing track, or an error when `fail`.
    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        fail: AtomicBool,
        nothing: AtomicBool,
    }

    impl PlaybackSource for FakeSource {
        fn current_playback(&self) -> PlaybackFuture<'_> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail.load(Ordering::SeqCst) {
                    return Err(spotify_api::Error::Request {
                        endpoint: "me/player/currently-playing".into(),
                        status: 503,
                    });
                }
                if self.nothing.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                let now: CurrentlyPlaying = serde_json::from_str(
                    r#"{"is_playing":true,"progress_ms":0,"item":{"id":"t","name":"Track","artists":[]}}"#,
                )
                .unwrap();
                Ok(Some(now))
            })
        }
    }

    fn poller(source: Arc<FakeSource>, visible: bool) -> PlaybackPoller {
        PlaybackPoller::new(source, DEFAULT_POLL_INTERVAL, VisibilitySignal::new(visible))
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_every_interval() {
        let source = Arc::new(FakeSource::default());
        let poller = poller(source.clone(), true);

        poller.start();
        sleep_secs(25).await;

        // t=0, t=10, t=20
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(poller.latest(), NowPlaying::Playing(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_playing_is_published() {
        let source = Arc::new(FakeSource::default());
        source.nothing.store(true, Ordering::SeqCst);
        let poller = poller(source.clone(), true);

        poller.start();
        sleep_secs(1).await;
        assert!(matches!(poller.latest(), NowPlaying::Nothing));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_ticks_make_no_calls_and_visibility_forces_refresh() {
        let source = Arc::new(FakeSource::default());
        let poller = poller(source.clone(), false);

        poller.start();
        sleep_secs(25).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        poller.visibility().set_visible(true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // cadence restarts from the forced refresh
        sleep_secs(9).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        sleep_secs(2).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn becoming_hidden_does_not_poll() {
        let source = Arc::new(FakeSource::default());
        let poller = poller(source.clone(), true);

        poller.start();
        sleep_secs(1).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        poller.visibility().set_visible(false);
        sleep_secs(30).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed_and_polling_continues() {
        let source = Arc::new(FakeSource::default());
        source.fail.store(true, Ordering::SeqCst);
        let poller = poller(source.clone(), true);

        poller.start();
        sleep_secs(25).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(poller.is_running());
        assert!(matches!(poller.latest(), NowPlaying::Unknown));

        source.fail.store(false, Ordering::SeqCst);
        sleep_secs(10).await;
        assert!(matches!(poller.latest(), NowPlaying::Playing(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_never_runs_two_timers() {
        let source = Arc::new(FakeSource::default());
        let poller = poller(source.clone(), true);

        poller.start();
        poller.start();
        sleep_secs(25).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_polling() {
        let source = Arc::new(FakeSource::default());
        let poller = poller(source.clone(), true);

        poller.start();
        sleep_secs(1).await;
        poller.stop();
        assert!(!poller.is_running());
        assert!(matches!(poller.latest(), NowPlaying::Unknown));

        sleep_secs(60).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
