use crate::cover_fetcher::{CoverDelivery, CoverFetcher};
use crate::error::PlaybackError;
use crate::spotify_client::{PlaybackSnapshot, PlaybackSource};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

/// Floor on any computed poll delay, and the cadence during ad breaks.
pub const DELAY_FLOOR_MS: u64 = 5_000;
/// Steady-state ceiling: never wait longer than this while music plays.
pub const STEADY_DELAY_MS: u64 = 15_000;
pub const AD_DELAY_MS: u64 = 5_000;
pub const TIMEOUT_DELAY_MS: u64 = 10_000;
/// Reduced cadence while authorization keeps failing.
pub const AUTH_DELAY_MS: u64 = 30_000;
/// Poll again shortly after the track is expected to end.
const TRACK_END_MARGIN_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatus {
    Loading,
    Idle,
    Paused,
    AdPlaying,
    Playing,
    Error,
}

/// Decoded cover bitmap as delivered by the fetcher.
#[derive(Debug, Clone)]
pub struct CoverArt {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// Everything the presentation surface needs to draw the pill. Owned by the
/// poll engine; mutated only on the poll task, read-only everywhere else.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub status: PlayStatus,
    pub track_id: Option<String>,
    pub title: String,
    pub artist: String,
    /// URL of the most recently requested cover; deliveries for any other
    /// URL are stale and get dropped.
    pub cover_url: Option<String>,
    pub cover: Option<CoverArt>,
    /// Bumped on every applied cover delivery so the view knows when to
    /// re-upload its texture.
    pub cover_epoch: u64,
    pub next_poll_delay_ms: u64,
    /// One-shot user-visible notice for the current failure episode.
    pub notice: Option<String>,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            status: PlayStatus::Loading,
            track_id: None,
            title: "Loading...".to_string(),
            artist: "Connecting to Spotify".to_string(),
            cover_url: None,
            cover: None,
            cover_epoch: 0,
            next_poll_delay_ms: 0,
            notice: None,
        }
    }

    fn clear_track(&mut self) {
        self.track_id = None;
        self.cover_url = None;
        self.cover = None;
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedPlayback = Arc<Mutex<PlaybackState>>;

/// What one tick decided, beyond the state mutation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub next_delay_ms: u64,
    /// Cover URL to fetch, set only when the computed URL differs from the
    /// previously fetched one.
    pub fetch_cover: Option<String>,
    /// User-visible notice, set at most once per failure episode.
    pub notice: Option<String>,
}

impl TickOutcome {
    fn delay(next_delay_ms: u64) -> Self {
        Self {
            next_delay_ms,
            fetch_cover: None,
            notice: None,
        }
    }
}

/// One poll-and-update cycle: interpret the query result, transition the
/// displayed state, and compute the delay before the next tick.
///
/// Timeouts and generic failures leave the displayed fields untouched so a
/// single dropped request never flickers the pill into an error state.
pub fn apply_tick(
    state: &mut PlaybackState,
    poll: Result<Option<PlaybackSnapshot>, PlaybackError>,
) -> TickOutcome {
    let outcome = match poll {
        Err(PlaybackError::Auth(reason)) => {
            let entering_error = state.status != PlayStatus::Error;
            state.status = PlayStatus::Error;
            state.title = "Re-auth Needed".to_string();
            state.artist = "Please restart the app".to_string();
            state.clear_track();

            let notice = entering_error
                .then(|| format!("Spotify authorization failed: {}", reason));
            if notice.is_some() {
                state.notice = notice.clone();
            }

            TickOutcome {
                next_delay_ms: AUTH_DELAY_MS,
                fetch_cover: None,
                notice,
            }
        }
        Err(PlaybackError::Timeout) => TickOutcome::delay(TIMEOUT_DELAY_MS),
        Err(PlaybackError::Api(_)) => TickOutcome::delay(STEADY_DELAY_MS),
        Ok(snapshot) => {
            state.notice = None;
            apply_snapshot(state, snapshot)
        }
    };

    state.next_poll_delay_ms = outcome.next_delay_ms;
    outcome
}

fn apply_snapshot(state: &mut PlaybackState, snapshot: Option<PlaybackSnapshot>) -> TickOutcome {
    let snap = match snapshot {
        None => {
            state.status = PlayStatus::Idle;
            state.title = "Nothing playing".to_string();
            state.artist = "Spotify Idle".to_string();
            state.clear_track();
            return TickOutcome::delay(STEADY_DELAY_MS);
        }
        Some(snap) => snap,
    };

    if !snap.is_playing {
        state.status = PlayStatus::Paused;
        state.title = "Music Paused".to_string();
        state.artist = "Spotify Idle".to_string();
        state.clear_track();
        return TickOutcome::delay(STEADY_DELAY_MS);
    }

    let item = match snap.item {
        None => {
            // Ad break: playback without a track item.
            state.status = PlayStatus::AdPlaying;
            state.title = "Ad playing...".to_string();
            state.artist = "Waiting for music".to_string();
            state.clear_track();
            return TickOutcome::delay(AD_DELAY_MS);
        }
        Some(item) => item,
    };

    let mut fetch_cover = None;
    if state.track_id.as_deref() != Some(item.id.as_str()) {
        log::info!("Track changed: {} - {}", item.artists.join(", "), item.name);
        state.track_id = Some(item.id.clone());
        state.title = item.name.clone();
        state.artist = item.artists.join(", ");

        let url = item.image_urls.first().cloned();
        if url != state.cover_url {
            state.cover_url = url.clone();
            state.cover = None;
            fetch_cover = url;
        }
    }
    state.status = PlayStatus::Playing;

    let remaining_ms = item
        .duration_ms
        .saturating_sub(snap.progress_ms)
        .max(DELAY_FLOOR_MS);
    let next_delay_ms = remaining_ms
        .saturating_add(TRACK_END_MARGIN_MS)
        .min(STEADY_DELAY_MS);

    TickOutcome {
        next_delay_ms,
        fetch_cover,
        notice: None,
    }
}

/// Apply a cover delivery if it still matches the currently desired URL.
/// Returns false for stale deliveries, which are dropped so an old track's
/// art can never overwrite a newer one.
pub fn apply_cover(state: &mut PlaybackState, delivery: CoverDelivery) -> bool {
    if state.cover_url.as_deref() != Some(delivery.url.as_str()) {
        log::debug!("Discarding stale cover delivery for {}", delivery.url);
        return false;
    }
    state.cover = delivery.art;
    state.cover_epoch += 1;
    true
}

/// Self-rescheduling poll task. Exactly one tick is ever in flight; the next
/// tick is scheduled only after the current one completes, using whatever
/// delay that tick computed.
pub struct PollEngine {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollEngine {
    /// Spawn the poll loop with the first tick scheduled immediately.
    pub fn start<S: PlaybackSource>(
        source: S,
        state: SharedPlayback,
        fetcher: CoverFetcher,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(source, state, fetcher, stop_rx));
        Self {
            stop_tx,
            task: Some(task),
        }
    }

    /// Cancel the pending scheduled tick. Idempotent. An in-flight query is
    /// allowed to finish in the background; its result is discarded.
    pub fn stop(&mut self) {
        if self.task.take().is_some() {
            let _ = self.stop_tx.send(true);
            log::info!("Poll engine stopped");
        }
    }
}

impl Drop for PollEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop<S: PlaybackSource>(
    source: S,
    state: SharedPlayback,
    fetcher: CoverFetcher,
    mut stop_rx: watch::Receiver<bool>,
) {
    let (cover_tx, mut cover_rx) = mpsc::channel::<CoverDelivery>(8);

    source.prepare().await;
    if *stop_rx.borrow() {
        return;
    }

    log::info!("Playback poll loop started");
    let mut next_tick = Instant::now();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            Some(delivery) = cover_rx.recv() => {
                let mut st = state.lock().unwrap();
                if apply_cover(&mut st, delivery) {
                    log::debug!("Cover art updated");
                }
            }
            _ = time::sleep_until(next_tick) => {
                let poll = source.current_playback().await;
                if *stop_rx.borrow() {
                    break;
                }

                let outcome = {
                    let mut st = state.lock().unwrap();
                    apply_tick(&mut st, poll)
                };

                if let Some(notice) = &outcome.notice {
                    log::warn!("{}", notice);
                }
                if let Some(url) = outcome.fetch_cover {
                    fetcher.fetch(url, cover_tx.clone());
                }

                next_tick = Instant::now() + Duration::from_millis(outcome.next_delay_ms);
            }
        }
    }

    log::info!("Playback poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify_client::PlayingItem;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(id: &str, duration_ms: u64, urls: &[&str]) -> PlayingItem {
        PlayingItem {
            id: id.to_string(),
            name: format!("Track {}", id),
            artists: vec!["Artist A".to_string(), "Artist B".to_string()],
            image_urls: urls.iter().map(|u| u.to_string()).collect(),
            duration_ms,
        }
    }

    fn playing(
        id: &str,
        duration_ms: u64,
        progress_ms: u64,
        urls: &[&str],
    ) -> Result<Option<PlaybackSnapshot>, PlaybackError> {
        Ok(Some(PlaybackSnapshot {
            is_playing: true,
            progress_ms,
            item: Some(item(id, duration_ms, urls)),
        }))
    }

    fn cover(url: &str) -> CoverDelivery {
        CoverDelivery {
            url: url.to_string(),
            art: Some(CoverArt {
                width: 1,
                height: 1,
                rgba: vec![0, 0, 0, 255],
            }),
        }
    }

    #[test]
    fn paused_playback_clears_track_and_waits_steady() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));

        let outcome = apply_tick(
            &mut state,
            Ok(Some(PlaybackSnapshot {
                is_playing: false,
                progress_ms: 0,
                item: Some(item("t1", 200_000, &["http://img/a"])),
            })),
        );

        assert_eq!(state.status, PlayStatus::Paused);
        assert_eq!(outcome.next_delay_ms, STEADY_DELAY_MS);
        assert!(state.track_id.is_none());
        assert!(state.cover_url.is_none());
        assert!(state.cover.is_none());
    }

    #[test]
    fn no_playback_data_means_idle() {
        let mut state = PlaybackState::new();
        let outcome = apply_tick(&mut state, Ok(None));

        assert_eq!(state.status, PlayStatus::Idle);
        assert_eq!(outcome.next_delay_ms, STEADY_DELAY_MS);
        assert!(state.track_id.is_none());
    }

    #[test]
    fn ad_break_polls_fast() {
        let mut state = PlaybackState::new();
        let outcome = apply_tick(
            &mut state,
            Ok(Some(PlaybackSnapshot {
                is_playing: true,
                progress_ms: 0,
                item: None,
            })),
        );

        assert_eq!(state.status, PlayStatus::AdPlaying);
        assert_eq!(outcome.next_delay_ms, AD_DELAY_MS);
        assert!(state.track_id.is_none());
        assert!(state.cover_url.is_none());
    }

    #[test]
    fn track_change_schedules_near_track_end() {
        let mut state = PlaybackState::new();
        let outcome = apply_tick(&mut state, playing("t1", 200_000, 190_000, &["http://img/a"]));

        // remaining = 10000, delay = min(10500, 15000)
        assert_eq!(outcome.next_delay_ms, 10_500);
        assert_eq!(state.status, PlayStatus::Playing);
        assert_eq!(state.track_id.as_deref(), Some("t1"));
        assert_eq!(state.title, "Track t1");
        assert_eq!(state.artist, "Artist A, Artist B");
        assert_eq!(outcome.fetch_cover.as_deref(), Some("http://img/a"));
        assert_eq!(state.cover_url.as_deref(), Some("http://img/a"));
    }

    #[test]
    fn long_remaining_time_is_capped_at_steady_ceiling() {
        let mut state = PlaybackState::new();
        let outcome = apply_tick(&mut state, playing("t1", 300_000, 0, &["http://img/a"]));
        assert_eq!(outcome.next_delay_ms, STEADY_DELAY_MS);
    }

    #[test]
    fn nearly_finished_track_still_respects_floor() {
        let mut state = PlaybackState::new();
        // Progress past the duration: remaining clamps to the floor.
        let outcome = apply_tick(&mut state, playing("t1", 100_000, 250_000, &["http://img/a"]));
        assert_eq!(outcome.next_delay_ms, DELAY_FLOOR_MS + 500);
    }

    #[test]
    fn repeated_polls_of_same_track_do_not_refetch_cover() {
        let mut state = PlaybackState::new();
        let first = apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));
        assert!(first.fetch_cover.is_some());

        let second = apply_tick(&mut state, playing("t1", 200_000, 20_000, &["http://img/a"]));
        assert!(second.fetch_cover.is_none());
        assert_eq!(state.track_id.as_deref(), Some("t1"));
    }

    #[test]
    fn track_change_with_same_album_art_keeps_bitmap() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));
        assert!(apply_cover(&mut state, cover("http://img/a")));
        assert!(state.cover.is_some());

        // Next track on the same album: URL unchanged, no refetch, art kept.
        let outcome = apply_tick(&mut state, playing("t2", 180_000, 0, &["http://img/a"]));
        assert!(outcome.fetch_cover.is_none());
        assert!(state.cover.is_some());
        assert_eq!(state.track_id.as_deref(), Some("t2"));
    }

    #[test]
    fn track_change_with_new_art_drops_old_bitmap_until_delivery() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));
        assert!(apply_cover(&mut state, cover("http://img/a")));

        let outcome = apply_tick(&mut state, playing("t2", 180_000, 0, &["http://img/b"]));
        assert_eq!(outcome.fetch_cover.as_deref(), Some("http://img/b"));
        assert!(state.cover.is_none());
    }

    #[test]
    fn track_without_album_art_clears_cover() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));
        assert!(apply_cover(&mut state, cover("http://img/a")));

        let outcome = apply_tick(&mut state, playing("t2", 180_000, 0, &[]));
        assert!(outcome.fetch_cover.is_none());
        assert!(state.cover_url.is_none());
        assert!(state.cover.is_none());
    }

    #[test]
    fn first_album_image_is_selected() {
        let mut state = PlaybackState::new();
        let outcome = apply_tick(
            &mut state,
            playing("t1", 200_000, 0, &["http://img/large", "http://img/small"]),
        );
        assert_eq!(outcome.fetch_cover.as_deref(), Some("http://img/large"));
    }

    #[test]
    fn auth_error_clears_track_and_notifies_once() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));

        let first = apply_tick(&mut state, Err(PlaybackError::Auth("401".to_string())));
        assert_eq!(state.status, PlayStatus::Error);
        assert_eq!(first.next_delay_ms, AUTH_DELAY_MS);
        assert!(state.track_id.is_none());
        assert!(state.cover_url.is_none());
        assert!(first.notice.is_some());
        assert!(state.notice.is_some());
        assert_eq!(state.title, "Re-auth Needed");

        // Repeated identical failure: no second notice.
        let second = apply_tick(&mut state, Err(PlaybackError::Auth("401".to_string())));
        assert!(second.notice.is_none());
        assert_eq!(second.next_delay_ms, AUTH_DELAY_MS);
    }

    #[test]
    fn recovery_after_auth_error_renotifies_on_next_failure() {
        let mut state = PlaybackState::new();
        assert!(apply_tick(&mut state, Err(PlaybackError::Auth("401".to_string())))
            .notice
            .is_some());

        apply_tick(&mut state, playing("t1", 200_000, 0, &["http://img/a"]));
        assert!(state.notice.is_none());
        assert_eq!(state.status, PlayStatus::Playing);

        // A new failure episode notifies again.
        assert!(apply_tick(&mut state, Err(PlaybackError::Auth("401".to_string())))
            .notice
            .is_some());
    }

    #[test]
    fn timeout_preserves_displayed_state() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));
        let before = state.clone();

        let outcome = apply_tick(&mut state, Err(PlaybackError::Timeout));
        assert_eq!(outcome.next_delay_ms, TIMEOUT_DELAY_MS);
        assert!(outcome.notice.is_none());
        assert_eq!(state.status, before.status);
        assert_eq!(state.track_id, before.track_id);
        assert_eq!(state.title, before.title);
        assert_eq!(state.artist, before.artist);
        assert_eq!(state.cover_url, before.cover_url);
    }

    #[test]
    fn generic_error_preserves_displayed_state_at_reduced_rate() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 10_000, &["http://img/a"]));

        let outcome = apply_tick(&mut state, Err(PlaybackError::Api("503".to_string())));
        assert_eq!(outcome.next_delay_ms, STEADY_DELAY_MS);
        assert_eq!(state.status, PlayStatus::Playing);
        assert_eq!(state.track_id.as_deref(), Some("t1"));
    }

    #[test]
    fn delay_always_within_bounds() {
        let polls: Vec<Result<Option<PlaybackSnapshot>, PlaybackError>> = vec![
            Ok(None),
            Ok(Some(PlaybackSnapshot {
                is_playing: false,
                progress_ms: 0,
                item: None,
            })),
            Ok(Some(PlaybackSnapshot {
                is_playing: true,
                progress_ms: 0,
                item: None,
            })),
            playing("a", 0, 0, &[]),
            playing("b", 1, 0, &[]),
            playing("c", 200_000, 190_000, &["http://img/a"]),
            playing("d", 300_000, 0, &["http://img/a"]),
            playing("e", u64::MAX, 0, &["http://img/a"]),
            playing("f", 100, u64::MAX, &["http://img/a"]),
            Err(PlaybackError::Auth("x".to_string())),
            Err(PlaybackError::Timeout),
            Err(PlaybackError::Api("x".to_string())),
        ];

        let mut state = PlaybackState::new();
        for poll in polls {
            let outcome = apply_tick(&mut state, poll);
            assert!(
                (DELAY_FLOOR_MS..=AUTH_DELAY_MS).contains(&outcome.next_delay_ms),
                "delay {} out of bounds",
                outcome.next_delay_ms
            );
            assert_eq!(state.next_poll_delay_ms, outcome.next_delay_ms);
        }
    }

    #[test]
    fn stale_cover_delivery_is_discarded() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 0, &["http://img/a"]));

        // Track moved on before the first fetch resolved.
        apply_tick(&mut state, playing("t2", 200_000, 0, &["http://img/b"]));
        assert!(apply_cover(&mut state, cover("http://img/b")));
        let epoch = state.cover_epoch;

        // The late delivery for the old URL must not overwrite the new art.
        assert!(!apply_cover(&mut state, cover("http://img/a")));
        assert_eq!(state.cover_epoch, epoch);
        assert!(state.cover.is_some());
    }

    #[test]
    fn failed_fetch_delivers_explicit_no_image() {
        let mut state = PlaybackState::new();
        apply_tick(&mut state, playing("t1", 200_000, 0, &["http://img/a"]));

        assert!(apply_cover(
            &mut state,
            CoverDelivery {
                url: "http://img/a".to_string(),
                art: None,
            }
        ));
        assert!(state.cover.is_none());
        assert_eq!(state.cover_epoch, 1);
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        poll: Result<Option<PlaybackSnapshot>, PlaybackError>,
    }

    impl PlaybackSource for CountingSource {
        fn current_playback(
            &self,
        ) -> impl Future<Output = Result<Option<PlaybackSnapshot>, PlaybackError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let poll = self.poll.clone();
            async move { poll }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn engine_ticks_immediately_then_on_computed_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: Arc::clone(&calls),
            poll: Ok(None),
        };
        let state: SharedPlayback = Arc::new(Mutex::new(PlaybackState::new()));
        let fetcher = CoverFetcher::new().unwrap();

        let mut engine = PollEngine::start(source, Arc::clone(&state), fetcher);

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.lock().unwrap().status, PlayStatus::Idle);

        // Idle schedules the steady 15s delay.
        time::sleep(Duration::from_millis(STEADY_DELAY_MS + 200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_halts_ticking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: Arc::clone(&calls),
            poll: Ok(None),
        };
        let state: SharedPlayback = Arc::new(Mutex::new(PlaybackState::new()));
        let fetcher = CoverFetcher::new().unwrap();

        let mut engine = PollEngine::start(source, state, fetcher);
        time::sleep(Duration::from_millis(100)).await;

        engine.stop();
        engine.stop();

        let before = calls.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }
}
