//! # engine::scheduler
//!
//! **Refresh Scheduler**: owns one fixed-interval timer per registered
//! source and runs that source's [`RefreshJob`] on every tick.
//!
//! ## Per-source state machine
//!
//! ```text
//!          tick / trigger                 fetch Ok  → apply()
//!   Idle ─────────────────▶ Fetching ───▶ fetch Err → on_error()  ───▶ Idle
//!                              │
//!                              └─ tick / trigger while Fetching → dropped (not queued)
//! ```
//!
//! * At most one fetch per source is ever in flight, so results are applied
//!   in the order their fetches were started.
//! * A failed fetch leaves previously applied state alone and is retried on
//!   the next tick at the same cadence.  There is no backoff.
//! * [`RefreshScheduler::unregister`] (or dropping the [`SourceHandle`])
//!   stops the timer, cancels the handle's [`LifecycleToken`] and aborts the
//!   in-flight fetch, so its result never reaches `apply`.  `unregister` also
//!   waits for the aborted fetch to wind down, which keeps a re-registered
//!   source id at one fetch in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lifecycle::LifecycleToken;
use crate::error::SyncError;

// ─── Job Contract ─────────────────────────────────────────────────────────────

/// The work behind one source: how to fetch, and what to do with the result.
#[async_trait]
pub trait RefreshJob: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn fetch(&self) -> Result<Self::Output, SyncError>;

    /// Called with every successful result, unless the source was unregistered
    /// while the fetch was in flight.
    async fn apply(&self, output: Self::Output);

    /// Called with every failed fetch, under the same lifecycle rule as `apply`.
    async fn on_error(&self, error: SyncError);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOptions {
    /// Forces a hung fetch back to `Idle` and reports [`SyncError::Timeout`].
    pub timeout: Option<Duration>,
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceState {
    Idle,
    Fetching,
}

/// Snapshot of one source, used for the dashboard's stale-data indicator.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source_id:            String,
    pub registration:         Uuid,
    pub state:                SourceState,
    pub interval_ms:          u64,
    pub fetches:              u64,
    pub dropped_ticks:        u64,
    pub consecutive_failures: u32,
    pub last_success_at:      Option<DateTime<Utc>>,
    pub last_error:           Option<String>,
    pub last_error_at:        Option<DateTime<Utc>>,
}

// ─── Source Slot ──────────────────────────────────────────────────────────────

struct SourceSlot {
    source_id:    String,
    registration: Uuid,
    fetching:     AtomicBool,
    trigger:      Notify,
    status:       Mutex<SourceStatus>,
    fetch_task:   Mutex<Option<JoinHandle<()>>>,
}

impl SourceSlot {
    fn new(source_id: String, interval: Duration) -> Self {
        let registration = Uuid::new_v4();
        Self {
            registration,
            fetching:     AtomicBool::new(false),
            trigger:      Notify::new(),
            status:       Mutex::new(SourceStatus {
                source_id:            source_id.clone(),
                registration,
                state:                SourceState::Idle,
                interval_ms:          interval.as_millis() as u64,
                fetches:              0,
                dropped_ticks:        0,
                consecutive_failures: 0,
                last_success_at:      None,
                last_error:           None,
                last_error_at:        None,
            }),
            fetch_task:   Mutex::new(None),
            source_id,
        }
    }

    /// `Idle → Fetching`.  `None` when a fetch is already outstanding.
    fn try_begin(self: &Arc<Self>) -> Option<InFlight> {
        self.fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        lock(&self.status).fetches += 1;
        Some(InFlight { slot: Arc::clone(self) })
    }

    fn record_dropped(&self) {
        lock(&self.status).dropped_ticks += 1;
    }

    fn record_success(&self) {
        let mut status = lock(&self.status);
        status.consecutive_failures = 0;
        status.last_success_at = Some(Utc::now());
    }

    fn record_failure(&self, error: &SyncError) {
        let mut status = lock(&self.status);
        status.consecutive_failures += 1;
        status.last_error = Some(error.to_string());
        status.last_error_at = Some(Utc::now());
    }

    /// Aborts the outstanding fetch task, if any, and hands it back.
    fn abort_fetch(&self) -> Option<JoinHandle<()>> {
        let task = lock(&self.fetch_task).take()?;
        task.abort();
        Some(task)
    }

    fn snapshot(&self) -> SourceStatus {
        let mut status = lock(&self.status).clone();
        status.state = if self.fetching.load(Ordering::Acquire) {
            SourceState::Fetching
        } else {
            SourceState::Idle
        };
        status
    }
}

/// Proof that this task owns the source's single fetch slot.  Returns the
/// source to `Idle` when dropped, including when the owning task is aborted.
struct InFlight {
    slot: Arc<SourceSlot>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.slot.fetching.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Registry = Mutex<HashMap<String, Arc<SourceSlot>>>;

// ─── Handles ──────────────────────────────────────────────────────────────────

/// Lifecycle handle for one registered source.  Owned by the view that
/// registered it; dropping it has the same effect as unregistering.
pub struct SourceHandle {
    slot:     Arc<SourceSlot>,
    token:    LifecycleToken,
    task:     JoinHandle<()>,
    registry: Weak<Registry>,
}

impl SourceHandle {
    pub fn source_id(&self) -> &str {
        &self.slot.source_id
    }

    /// Requests an out-of-cadence fetch.  Dropped if one is already in flight.
    pub fn trigger(&self) {
        self.slot.trigger.notify_one();
    }

    /// A cloneable trigger, e.g. for a freshness probe's change callback.
    pub fn refresh_trigger(&self) -> RefreshTrigger {
        RefreshTrigger { slot: Arc::downgrade(&self.slot) }
    }

    pub fn status(&self) -> SourceStatus {
        self.slot.snapshot()
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.token.cancel_now();
        self.task.abort();
        self.slot.abort_fetch();

        if let Some(registry) = self.registry.upgrade() {
            let mut sources = lock(&registry);
            if sources
                .get(&self.slot.source_id)
                .is_some_and(|s| s.registration == self.slot.registration)
            {
                sources.remove(&self.slot.source_id);
            }
        }
    }
}

/// Cloneable, weak trigger for one source.  Firing it after the source is
/// gone is a no-op.
#[derive(Clone)]
pub struct RefreshTrigger {
    slot: Weak<SourceSlot>,
}

impl RefreshTrigger {
    pub fn fire(&self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.trigger.notify_one();
        }
    }
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

/// Registry of live sources.  Cheap to clone; all clones share one registry.
#[derive(Clone, Default)]
pub struct RefreshScheduler {
    sources: Arc<Registry>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` under `source_id` and runs its first fetch immediately.
    pub fn register<J: RefreshJob>(
        &self,
        source_id: impl Into<String>,
        interval: Duration,
        job: J,
    ) -> Result<SourceHandle, SyncError> {
        self.register_with(source_id, interval, job, SourceOptions::default())
    }

    pub fn register_with<J: RefreshJob>(
        &self,
        source_id: impl Into<String>,
        interval: Duration,
        job: J,
        options: SourceOptions,
    ) -> Result<SourceHandle, SyncError> {
        let source_id = source_id.into();
        if interval.is_zero() {
            return Err(SyncError::InvalidInterval);
        }

        let slot = {
            let mut sources = lock(&self.sources);
            if sources.contains_key(&source_id) {
                return Err(SyncError::DuplicateSource(source_id));
            }
            let slot = Arc::new(SourceSlot::new(source_id.clone(), interval));
            sources.insert(source_id.clone(), Arc::clone(&slot));
            slot
        };

        let token = LifecycleToken::new();
        let task = tokio::spawn(drive(
            Arc::clone(&slot),
            Arc::new(job),
            interval,
            options,
            token.clone(),
        ));

        info!(
            source       = %source_id,
            interval_ms  = interval.as_millis() as u64,
            timeout      = ?options.timeout,
            registration = %slot.registration,
            "📡 Source registered"
        );

        Ok(SourceHandle {
            slot,
            token,
            task,
            registry: Arc::downgrade(&self.sources),
        })
    }

    /// Stops the source's timer and waits until no callback or fetch of it is
    /// still running.
    pub async fn unregister(&self, mut handle: SourceHandle) {
        handle.token.cancel().await;

        // The driver must be gone before the fetch slot is inspected, or it
        // could spawn one more fetch behind our back.
        handle.task.abort();
        let _ = (&mut handle.task).await;
        if let Some(fetch) = handle.slot.abort_fetch() {
            let _ = fetch.await;
        }

        info!(
            source       = %handle.source_id(),
            registration = %handle.slot.registration,
            "Source unregistered"
        );
        drop(handle);
    }

    pub fn status(&self, source_id: &str) -> Option<SourceStatus> {
        lock(&self.sources).get(source_id).map(|s| s.snapshot())
    }

    /// All live sources, ordered by id.
    pub fn statuses(&self) -> Vec<SourceStatus> {
        let mut all: Vec<_> = lock(&self.sources).values().map(|s| s.snapshot()).collect();
        all.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        all
    }
}

// ─── Driver ───────────────────────────────────────────────────────────────────

async fn drive<J: RefreshJob>(
    slot: Arc<SourceSlot>,
    job: Arc<J>,
    interval: Duration,
    options: SourceOptions,
    token: LifecycleToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let reason = tokio::select! {
            _ = ticker.tick() => "interval",
            _ = slot.trigger.notified() => "trigger",
        };

        if token.is_cancelled() {
            break;
        }

        let Some(in_flight) = slot.try_begin() else {
            slot.record_dropped();
            debug!(source = %slot.source_id, reason, "Fetch still in flight — tick dropped");
            continue;
        };

        debug!(source = %slot.source_id, reason, "Fetch starting");
        let fetch = tokio::spawn(run_fetch(in_flight, Arc::clone(&job), options.timeout, token.clone()));
        // Any previous task has already released the slot.
        *lock(&slot.fetch_task) = Some(fetch);
    }
}

async fn run_fetch<J: RefreshJob>(
    in_flight: InFlight,
    job: Arc<J>,
    timeout: Option<Duration>,
    token: LifecycleToken,
) {
    let slot = Arc::clone(&in_flight.slot);
    let started = Instant::now();

    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, job.fetch())
            .await
            .unwrap_or_else(|_| Err(SyncError::Timeout(limit))),
        None => job.fetch().await,
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(output) => {
            slot.record_success();
            debug!(source = %slot.source_id, elapsed_ms, "Fetch succeeded");
            if token.run_if_live(job.apply(output)).await.is_none() {
                debug!(source = %slot.source_id, "Source unregistered mid-fetch — result discarded");
            }
        }
        Err(error) => {
            slot.record_failure(&error);
            warn!(
                source = %slot.source_id,
                elapsed_ms,
                error  = %error,
                "⚠️ Fetch failed — keeping last-known-good data"
            );
            token.run_if_live(job.on_error(error)).await;
        }
    }

    // Released only after apply / on_error so the next fetch cannot overtake them.
    drop(in_flight);
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Test job: optional per-fetch delay, scripted outcomes, recorded effects.
    #[derive(Default)]
    struct Recorder {
        delay:        Duration,
        script:       Mutex<VecDeque<Result<u32, SyncError>>>,
        fetches:      AtomicUsize,
        in_flight:    AtomicUsize,
        max_parallel: AtomicUsize,
        applied:      Mutex<Vec<u32>>,
        errors:       Mutex<Vec<String>>,
    }

    struct Job(Arc<Recorder>);

    /// Keeps `in_flight` honest when a fetch is aborted mid-sleep.
    struct Running<'a>(&'a AtomicUsize);

    impl Drop for Running<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RefreshJob for Job {
        type Output = u32;

        async fn fetch(&self) -> Result<u32, SyncError> {
            let n = self.0.fetches.fetch_add(1, Ordering::SeqCst) as u32;
            let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.max_parallel.fetch_max(now, Ordering::SeqCst);
            let _running = Running(&self.0.in_flight);
            if !self.0.delay.is_zero() {
                tokio::time::sleep(self.0.delay).await;
            }
            let scripted = lock(&self.0.script).pop_front();
            scripted.unwrap_or(Ok(n))
        }

        async fn apply(&self, output: u32) {
            lock(&self.0.applied).push(output);
        }

        async fn on_error(&self, error: SyncError) {
            lock(&self.0.errors).push(error.to_string());
        }
    }

    fn recorder(delay: Duration) -> Arc<Recorder> {
        Arc::new(Recorder { delay, ..Default::default() })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_immediate_then_fixed_cadence() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::ZERO);
        let _handle = scheduler
            .register("signals", Duration::from_millis(100), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(p.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(*lock(&p.applied), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_fetch_in_flight() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::from_millis(250));
        let handle = scheduler
            .register("signals", Duration::from_millis(100), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(p.max_parallel.load(Ordering::SeqCst), 1);
        let status = handle.status();
        assert!(status.dropped_ticks >= 2, "dropped = {}", status.dropped_ticks);
        assert!(p.fetches.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_fetching_is_dropped() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::from_millis(200));
        let handle = scheduler
            .register("signals", Duration::from_secs(3_600), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.trigger();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(p.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(*lock(&p.applied), vec![0]);
        assert_eq!(handle.status().dropped_ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_when_idle_fetches_again() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::ZERO);
        let handle = scheduler
            .register("signals", Duration::from_secs(3_600), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.refresh_trigger().fire();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(p.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_applied_state_and_retries() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::ZERO);
        lock(&p.script).extend([Ok(10), Err(SyncError::Http("boom".into())), Ok(20)]);
        let handle = scheduler
            .register("prices", Duration::from_millis(100), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let status = handle.status();
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.as_deref().unwrap().contains("boom"));
        assert_eq!(*lock(&p.applied), vec![10]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*lock(&p.applied), vec![10, 20]);
        assert_eq!(lock(&p.errors).len(), 1);
        assert_eq!(handle.status().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_discards_in_flight_result() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::from_millis(200));
        let handle = scheduler
            .register("signals", Duration::from_millis(100), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.unregister(handle).await;
        assert!(scheduler.status("signals").is_none());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(p.fetches.load(Ordering::SeqCst), 1);
        assert!(lock(&p.applied).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistered_source_never_overlaps_old_fetch() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::from_millis(500));
        let first = scheduler
            .register("signals", Duration::from_secs(60), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.unregister(first).await;
        assert_eq!(p.in_flight.load(Ordering::SeqCst), 0);

        let _second = scheduler
            .register("signals", Duration::from_secs(60), Job(p.clone()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(p.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(p.max_parallel.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(*lock(&p.applied), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_aborts_in_flight_fetch() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::from_millis(500));
        let handle = scheduler
            .register("signals", Duration::from_secs(60), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(p.in_flight.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(lock(&p.applied).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_source() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::ZERO);
        let handle = scheduler
            .register("signals", Duration::from_millis(100), Job(p.clone()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(p.fetches.load(Ordering::SeqCst), 1);
        assert!(scheduler.statuses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_source_refused_until_unregistered() {
        let scheduler = RefreshScheduler::new();
        let first = scheduler
            .register("signals", Duration::from_secs(1), Job(recorder(Duration::ZERO)))
            .unwrap();

        let err = scheduler
            .register("signals", Duration::from_secs(1), Job(recorder(Duration::ZERO)))
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::DuplicateSource(id) if id == "signals"));

        scheduler.unregister(first).await;
        assert!(scheduler
            .register("signals", Duration::from_secs(1), Job(recorder(Duration::ZERO)))
            .is_ok());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = RefreshScheduler::new();
        let err = scheduler
            .register("signals", Duration::ZERO, Job(recorder(Duration::ZERO)))
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::InvalidInterval));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_source_to_idle() {
        let scheduler = RefreshScheduler::new();
        let p = recorder(Duration::from_secs(60));
        let handle = scheduler
            .register_with(
                "signals",
                Duration::from_secs(1),
                Job(p.clone()),
                SourceOptions { timeout: Some(Duration::from_millis(100)) },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let status = handle.status();
        assert_eq!(status.state, SourceState::Idle);
        assert_eq!(status.consecutive_failures, 1);
        assert!(lock(&p.errors)[0].contains("timed out"));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(p.fetches.load(Ordering::SeqCst), 2);
    }
}
