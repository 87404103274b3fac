//! Thread-safe session handle with an asynchronous rest ticker and
//! best-effort persistence.
//!
//! [`SessionEngine`] owns one [`WorkoutSession`] behind a mutex, so every
//! mutation runs to completion before the next one starts. Rest status is
//! published on a `tokio::sync::watch` channel: once when a mutation changes
//! it, and once per second from a ticker task while a countdown runs.
//!
//! ## Completion contract
//!
//! `complete` resets the session first and persists second. The save runs
//! after the session lock is released. If it fails the log is still
//! returned, a warning is logged, and the log is queued in the outbox for
//! [`SessionEngine::flush_outbox`].

use crate::clock::{Clock, SystemClock};
use crate::outbox::Outbox;
use crate::rest_timer::{RestStatus, RestTick};
use crate::session::{SessionSnapshot, SetOutcome, WorkoutSession};
use crate::store::WorkoutLogStore;
use crate::{Result, WorkoutLog, WorkoutPlan};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const TICK: Duration = Duration::from_secs(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The task driving one countdown
struct Ticker {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct SessionEngine<C: Clock + 'static = SystemClock> {
    session: Arc<Mutex<WorkoutSession<C>>>,
    store: Arc<dyn WorkoutLogStore>,
    user_id: String,
    outbox: Mutex<Outbox>,
    rest_tx: Arc<watch::Sender<RestStatus>>,
    /// Always locked before `session`
    ticker: Mutex<Option<Ticker>>,
}

impl SessionEngine<SystemClock> {
    pub fn new(store: Arc<dyn WorkoutLogStore>, user_id: impl Into<String>) -> Self {
        Self::with_clock(SystemClock, store, user_id)
    }
}

impl<C: Clock + 'static> SessionEngine<C> {
    pub fn with_clock(
        clock: C,
        store: Arc<dyn WorkoutLogStore>,
        user_id: impl Into<String>,
    ) -> Self {
        let (rest_tx, _) = watch::channel(RestStatus::default());
        Self {
            session: Arc::new(Mutex::new(WorkoutSession::with_clock(clock))),
            store,
            user_id: user_id.into(),
            outbox: Mutex::new(Outbox::new()),
            rest_tx: Arc::new(rest_tx),
            ticker: Mutex::new(None),
        }
    }

    /// Receive rest timer updates (latest value only)
    pub fn subscribe_rest(&self) -> watch::Receiver<RestStatus> {
        self.rest_tx.subscribe()
    }

    /// Run one mutation under the single-writer lock, then publish the rest
    /// status and start or stop the ticker to match it.
    fn with_session<R>(&self, f: impl FnOnce(&mut WorkoutSession<C>) -> R) -> R {
        let mut ticker = lock(&self.ticker);
        let mut session = lock(&self.session);

        let result = f(&mut session);

        let status = session.rest_status();
        self.rest_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        self.sync_ticker(&mut ticker, status);
        result
    }

    fn sync_ticker(&self, slot: &mut Option<Ticker>, status: RestStatus) {
        if let Some(running) = slot.take() {
            if status.active && running.generation == status.generation {
                *slot = Some(running);
                return;
            }
            running.handle.abort();
        }
        if status.active {
            *slot = self.spawn_ticker(status.generation);
        }
    }

    /// Spawn the 1-second cadence for countdown `generation`.
    ///
    /// Needs a Tokio runtime; without one the countdown is still exact when
    /// read through `rest_status`, it just isn't pushed to subscribers.
    fn spawn_ticker(&self, generation: u64) -> Option<Ticker> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("no tokio runtime, rest ticker not started");
                return None;
            }
        };

        let session = Arc::clone(&self.session);
        let tx = Arc::clone(&self.rest_tx);

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                interval.tick().await;

                // Publish under the session lock so a tick can never land
                // after a cancellation has been published.
                let mut guard = lock(&session);
                if guard.rest_status().generation != generation {
                    break;
                }
                match guard.poll_rest_timer() {
                    RestTick::Counting(left) => {
                        tx.send_replace(RestStatus {
                            active: true,
                            remaining_secs: left,
                            generation,
                        });
                    }
                    RestTick::Expired => {
                        tx.send_replace(RestStatus {
                            active: false,
                            remaining_secs: 0,
                            generation,
                        });
                        break;
                    }
                    RestTick::Idle => break,
                }
            }
            tracing::trace!(generation, "rest ticker stopped");
        });

        Some(Ticker { generation, handle })
    }

    pub fn start(&self, plan: &WorkoutPlan) -> Result<()> {
        self.with_session(|s| s.start(plan))
    }

    pub fn log_set(&self, exercise_index: usize, reps: u32, weight: f64) -> SetOutcome {
        self.with_session(|s| s.log_set(exercise_index, reps, weight))
    }

    pub fn skip_set(&self, exercise_index: usize) -> SetOutcome {
        self.with_session(|s| s.skip_set(exercise_index))
    }

    pub fn next_exercise(&self) -> Option<usize> {
        self.with_session(|s| s.next_exercise())
    }

    pub fn prev_exercise(&self) -> Option<usize> {
        self.with_session(|s| s.prev_exercise())
    }

    pub fn set_current_exercise(&self, index: usize) -> Option<usize> {
        self.with_session(|s| s.set_current_exercise(index))
    }

    pub fn cancel_rest_timer(&self) -> bool {
        self.with_session(|s| s.cancel_rest_timer())
    }

    /// Bring the rest timer up to date without a runtime-driven ticker
    pub fn tick(&self) -> RestStatus {
        self.with_session(|s| {
            s.poll_rest_timer();
            s.rest_status()
        })
    }

    pub fn rest_status(&self) -> RestStatus {
        lock(&self.session).rest_status()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        lock(&self.session).snapshot()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.session).is_active()
    }

    /// Discard the running session. Nothing is persisted.
    pub fn cancel(&self) -> bool {
        self.with_session(|s| s.cancel())
    }

    /// Finish the session, then attempt to persist its log.
    ///
    /// Returns `None` if no session was active. The returned log does not
    /// depend on whether the save succeeded.
    pub fn complete(&self, rating: u8, note: &str) -> Option<WorkoutLog> {
        let log = self.with_session(|s| s.complete(rating, note))?;
        self.persist(&log);
        Some(log)
    }

    fn persist(&self, log: &WorkoutLog) {
        match self.store.save(&self.user_id, &log.date_key, log) {
            Ok(()) => {
                tracing::info!(log_id = %log.id, date = %log.date_key, "workout log saved");
            }
            Err(e) => {
                tracing::warn!(
                    log_id = %log.id,
                    "Failed to save workout log, queued for retry: {}",
                    e
                );
                lock(&self.outbox).push(&self.user_id, &log.date_key, log.clone());
            }
        }
    }

    /// Logs waiting for a successful save
    pub fn pending_count(&self) -> usize {
        lock(&self.outbox).len()
    }

    /// Retry queued saves once. Returns how many were delivered.
    pub fn flush_outbox(&self) -> usize {
        // Saves run unlocked so a concurrent `complete` can still queue
        let mut batch = std::mem::take(&mut *lock(&self.outbox));
        let delivered = batch.flush(self.store.as_ref());
        lock(&self.outbox).requeue(batch);
        delivered
    }

    /// Up to `limit` logs for this engine's user, newest first
    pub fn history(&self, limit: usize) -> Result<Vec<WorkoutLog>> {
        self.store.fetch_history(&self.user_id, limit)
    }
}

impl<C: Clock + 'static> Drop for SessionEngine<C> {
    fn drop(&mut self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{JsonlLogStore, MemoryLogStore};
    use crate::{Error, Exercise, IgnoreReason};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    /// Counts calls and fails on demand
    #[derive(Default)]
    struct RecordingStore {
        saves: AtomicUsize,
        offline: AtomicBool,
        inner: MemoryLogStore,
    }

    impl WorkoutLogStore for RecordingStore {
        fn save(&self, user_id: &str, date_key: &str, log: &WorkoutLog) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Persistence("connection refused".into()));
            }
            self.inner.save(user_id, date_key, log)
        }

        fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<WorkoutLog>> {
            self.inner.fetch_history(user_id, limit)
        }
    }

    fn plan(sets: &[u32], rest_seconds: u32) -> WorkoutPlan {
        WorkoutPlan {
            name: "Engine".into(),
            target_muscles: vec![],
            estimated_duration_minutes: 30,
            estimated_calories: None,
            warmup: vec![],
            exercises: sets
                .iter()
                .enumerate()
                .map(|(i, &sets)| Exercise {
                    name: format!("Exercise {}", i + 1),
                    muscle_group: String::new(),
                    sets,
                    rep_target: String::new(),
                    suggested_load: String::new(),
                    rest_seconds,
                    instructions: String::new(),
                    tips: vec![],
                    alternatives: vec![],
                    completed_sets: vec![],
                })
                .collect(),
            cooldown: vec![],
            coach_note: String::new(),
        }
    }

    fn engine(store: Arc<RecordingStore>) -> (SessionEngine<ManualClock>, ManualClock) {
        crate::logging::init_test();
        let clock = ManualClock::new(Utc::now());
        let engine = SessionEngine::with_clock(clock.clone(), store, "ana");
        (engine, clock)
    }

    #[test]
    fn test_cancel_never_touches_store() {
        let store = Arc::new(RecordingStore::default());
        let (engine, _) = engine(Arc::clone(&store));
        engine.start(&plan(&[3], 20)).unwrap();
        engine.log_set(0, 10, 20.0);

        assert!(engine.cancel());

        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        assert!(engine.history(10).unwrap().is_empty());
        assert!(engine.complete(5, "").is_none());
        assert!(!engine.is_active());
    }

    #[test]
    fn test_complete_saves_once_under_user_and_date() {
        let store = Arc::new(RecordingStore::default());
        let (engine, clock) = engine(Arc::clone(&store));
        engine.start(&plan(&[3, 2], 20)).unwrap();
        for _ in 0..3 {
            engine.log_set(0, 10, 20.0);
        }
        engine.next_exercise();
        for _ in 0..2 {
            engine.log_set(1, 8, 0.0);
        }
        clock.advance_secs(600);

        let log = engine.complete(5, "good").unwrap();

        assert_eq!(log.total_volume, 600.0);
        assert_eq!(log.completed_exercises, 2);
        assert_eq!(log.total_sets, 5);
        assert_eq!(log.completed_sets, 5);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);

        let history = engine.history(5).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], log);
        assert!(engine.complete(5, "again").is_none());
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_save_still_resets_and_returns_log() {
        let store = Arc::new(RecordingStore::default());
        store.offline.store(true, Ordering::SeqCst);
        let (engine, _) = engine(Arc::clone(&store));
        engine.start(&plan(&[2], 20)).unwrap();
        engine.log_set(0, 5, 100.0);

        let log = engine.complete(3, "").unwrap();

        assert_eq!(log.total_volume, 500.0);
        assert!(!engine.is_active());
        assert_eq!(engine.pending_count(), 1);

        // A new session can start while the old log waits
        engine.start(&plan(&[2], 20)).unwrap();

        store.offline.store(false, Ordering::SeqCst);
        assert_eq!(engine.flush_outbox(), 1);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.history(5).unwrap()[0].id, log.id);
    }

    #[test]
    fn test_flush_keeps_later_same_day_log() {
        crate::logging::init_test();
        let store = Arc::new(RecordingStore::default());
        store.offline.store(true, Ordering::SeqCst);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let engine = SessionEngine::with_clock(
            clock.clone(),
            Arc::clone(&store) as Arc<dyn WorkoutLogStore>,
            "ana",
        );

        engine.start(&plan(&[2], 20)).unwrap();
        engine.log_set(0, 5, 50.0);
        clock.advance_secs(1800);
        engine.complete(3, "morning").unwrap();
        assert_eq!(engine.pending_count(), 1);

        clock.advance_secs(6 * 3600);
        store.offline.store(false, Ordering::SeqCst);
        engine.start(&plan(&[2], 20)).unwrap();
        engine.log_set(0, 8, 60.0);
        clock.advance_secs(1800);
        engine.complete(5, "evening").unwrap();

        assert_eq!(engine.flush_outbox(), 0);
        assert_eq!(engine.pending_count(), 0);
        let history = engine.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].note, "evening");
    }

    #[test]
    fn test_invalid_weight_never_reaches_history() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlLogStore::new(temp_dir.path().join("history.jsonl")));
        let engine = SessionEngine::new(store, "ana");
        engine.start(&plan(&[2], 0)).unwrap();

        assert_eq!(
            engine.log_set(0, 10, f64::NAN),
            SetOutcome::Ignored(IgnoreReason::InvalidWeight)
        );
        engine.log_set(0, 10, 20.0);
        let log = engine.complete(4, "").unwrap();

        assert_eq!(log.total_volume, 200.0);
        assert_eq!(engine.pending_count(), 0);
        let history = engine.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, log.id);
    }

    /// Parks the first successful save until released
    struct GatedStore {
        online: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        inner: MemoryLogStore,
    }

    impl WorkoutLogStore for GatedStore {
        fn save(&self, user_id: &str, date_key: &str, log: &WorkoutLog) -> Result<()> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(Error::Persistence("store offline".into()));
            }
            lock(&self.entered).send(()).unwrap();
            lock(&self.release).recv().unwrap();
            self.inner.save(user_id, date_key, log)
        }

        fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<WorkoutLog>> {
            self.inner.fetch_history(user_id, limit)
        }
    }

    #[test]
    fn test_flush_does_not_block_completion() {
        crate::logging::init_test();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            online: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            inner: MemoryLogStore::new(),
        });
        let engine = Arc::new(SessionEngine::new(
            Arc::clone(&store) as Arc<dyn WorkoutLogStore>,
            "ana",
        ));

        engine.start(&plan(&[1], 0)).unwrap();
        engine.complete(3, "first").unwrap();
        assert_eq!(engine.pending_count(), 1);

        store.online.store(true, Ordering::SeqCst);
        let flusher = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.flush_outbox())
        };
        entered_rx.recv().unwrap();

        // The flush is parked inside the store; a failing save still queues
        store.online.store(false, Ordering::SeqCst);
        engine.start(&plan(&[1], 0)).unwrap();
        engine.complete(4, "second").unwrap();
        assert_eq!(engine.pending_count(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(flusher.join().unwrap(), 1);
        assert_eq!(engine.pending_count(), 1);
    }

    #[test]
    fn test_works_without_runtime() {
        let store = Arc::new(RecordingStore::default());
        let (engine, clock) = engine(store);
        engine.start(&plan(&[3], 30)).unwrap();
        let rx = engine.subscribe_rest();

        engine.log_set(0, 10, 20.0);
        assert!(rx.borrow().active);
        assert_eq!(rx.borrow().remaining_secs, 30);

        clock.advance_secs(12);
        assert_eq!(engine.tick().remaining_secs, 18);
        assert_eq!(rx.borrow().remaining_secs, 18);

        clock.advance_secs(40);
        let status = engine.tick();
        assert!(!status.active);
        assert!(!rx.borrow().active);
    }

    #[test]
    fn test_concurrent_logging_counts_every_set() {
        let store = Arc::new(RecordingStore::default());
        let (engine, _) = engine(store);
        let engine = Arc::new(engine);
        engine.start(&plan(&[40], 0)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| {
                            matches!(engine.log_set(0, 5, 10.0), SetOutcome::Logged { .. })
                        })
                        .count()
                })
            })
            .collect();
        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(accepted, 40);
        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.completed_sets, 40);
        assert_eq!(snap.set_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_counts_down_to_idle() {
        let store = Arc::new(RecordingStore::default());
        let (engine, clock) = engine(store);
        engine.start(&plan(&[3], 3)).unwrap();
        let mut rx = engine.subscribe_rest();

        engine.log_set(0, 10, 20.0);
        let first = *rx.borrow_and_update();
        assert!(first.active);
        assert_eq!(first.remaining_secs, 3);

        // Offset the test half a tick from the ticker
        tokio::time::sleep(Duration::from_millis(500)).await;
        for expected in [2, 1] {
            clock.advance_secs(1);
            tokio::time::sleep(TICK).await;
            let status = *rx.borrow_and_update();
            assert!(status.active);
            assert_eq!(status.remaining_secs, expected);
            assert_eq!(status.generation, first.generation);
        }

        clock.advance_secs(1);
        tokio::time::sleep(TICK).await;
        let status = *rx.borrow_and_update();
        assert!(!status.active);
        assert_eq!(status.remaining_secs, 0);
        // Expiry leaves the set pointer where logging put it
        assert_eq!(engine.snapshot().unwrap().set_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_stops_ticks() {
        let store = Arc::new(RecordingStore::default());
        let (engine, clock) = engine(store);
        engine.start(&plan(&[3, 3], 30)).unwrap();
        let mut rx = engine.subscribe_rest();

        engine.log_set(0, 10, 20.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        clock.advance_secs(1);
        tokio::time::sleep(TICK).await;
        assert_eq!(rx.borrow_and_update().remaining_secs, 29);

        engine.next_exercise();
        let status = *rx.borrow_and_update();
        assert!(!status.active);
        assert_eq!(status.remaining_secs, 0);

        for _ in 0..5 {
            clock.advance_secs(1);
            tokio::time::sleep(TICK).await;
        }
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_rest_timer_stops_ticks() {
        let store = Arc::new(RecordingStore::default());
        let (engine, clock) = engine(store);
        engine.start(&plan(&[3], 30)).unwrap();
        let mut rx = engine.subscribe_rest();

        engine.log_set(0, 10, 20.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        clock.advance_secs(1);
        tokio::time::sleep(TICK).await;
        assert_eq!(rx.borrow_and_update().remaining_secs, 29);

        assert!(engine.cancel_rest_timer());
        let status = *rx.borrow_and_update();
        assert!(!status.active);
        assert_eq!(status.remaining_secs, 0);
        assert_eq!(engine.snapshot().unwrap().set_index, 1);

        for _ in 0..5 {
            clock.advance_secs(1);
            tokio::time::sleep(TICK).await;
        }
        assert!(!rx.has_changed().unwrap());
        assert!(!engine.cancel_rest_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_countdown_replaces_old_ticker() {
        let store = Arc::new(RecordingStore::default());
        let (engine, clock) = engine(store);
        engine.start(&plan(&[4], 10)).unwrap();
        let mut rx = engine.subscribe_rest();

        engine.log_set(0, 10, 20.0);
        let first = rx.borrow_and_update().generation;
        tokio::time::sleep(Duration::from_millis(500)).await;
        clock.advance_secs(3);
        tokio::time::sleep(TICK).await;
        assert_eq!(rx.borrow_and_update().remaining_secs, 7);

        engine.log_set(0, 10, 20.0);
        let replaced = *rx.borrow_and_update();
        assert!(replaced.generation > first);
        assert_eq!(replaced.remaining_secs, 10);

        tokio::time::sleep(Duration::from_millis(500)).await;
        clock.advance_secs(1);
        tokio::time::sleep(TICK).await;
        let status = *rx.borrow_and_update();
        assert_eq!(status.remaining_secs, 9);
        assert_eq!(status.generation, replaced.generation);
    }
}
