//! # engine::probe
//!
//! **Freshness Probe**: a cheap poll that asks the backend "did anything
//! change?" before anybody pays for a full refetch.
//!
//! ```text
//! every poll_interval:
//!   versions = fetch_versions(keys)          ── one request for all keys
//!   Err  → log, fire nothing, ledger untouched
//!   Ok   → changed = ledger.observe(versions)
//!          changed non-empty → on_change(changed)   (once per cycle, not per key)
//! ```
//!
//! The first successful poll only establishes the baseline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lifecycle::LifecycleToken;
use crate::error::SyncError;
use crate::models::{ResourceVersion, VersionToken};

// ─── Version Source ───────────────────────────────────────────────────────────

/// The resource-version endpoint, as seen by the probe.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn fetch_versions(&self, keys: &[String]) -> Result<Vec<ResourceVersion>, SyncError>;
}

// ─── Ledger ───────────────────────────────────────────────────────────────────

/// Last observed token per watched key.
#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    watched:  Vec<String>,
    observed: HashMap<String, VersionToken>,
}

impl VersionLedger {
    pub fn new(watched: Vec<String>) -> Self {
        Self {
            watched,
            observed: HashMap::new(),
        }
    }

    /// Records `versions` and returns the watched keys whose token differs
    /// from the previously observed one, in watch order.
    ///
    /// Every watched key present in `versions` is overwritten, changed or not.
    /// A key seen for the first time is a baseline, not a change.  Keys missing
    /// from `versions` keep their last token.
    pub fn observe(&mut self, versions: &[ResourceVersion]) -> Vec<String> {
        let incoming: HashMap<&str, &VersionToken> = versions
            .iter()
            .map(|v| (v.resource_key.as_str(), &v.token))
            .collect();

        let mut changed = Vec::new();
        for key in &self.watched {
            let Some(&token) = incoming.get(key.as_str()) else {
                continue;
            };
            if let Some(previous) = self.observed.insert(key.clone(), token.clone()) {
                if previous != *token {
                    changed.push(key.clone());
                }
            }
        }
        changed
    }

    pub fn last_observed(&self, key: &str) -> Option<&VersionToken> {
        self.observed.get(key)
    }
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeStatus {
    pub id:            Option<Uuid>,
    pub keys:          Vec<String>,
    pub polls:         u64,
    pub failures:      u64,
    pub changes_fired: u64,
    pub last_poll_at:  Option<DateTime<Utc>>,
    pub last_change:   Vec<String>,
    pub last_error:    Option<String>,
}

// ─── Handle ───────────────────────────────────────────────────────────────────

/// Lifecycle handle for one `watch` call.  Dropping it stops the probe.
pub struct ProbeHandle {
    id:     Uuid,
    token:  LifecycleToken,
    task:   JoinHandle<()>,
    status: Arc<Mutex<ProbeStatus>>,
}

impl ProbeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ProbeStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.token.cancel_now();
        self.task.abort();
    }
}

// ─── Probe ────────────────────────────────────────────────────────────────────

pub struct FreshnessProbe<V: ?Sized> {
    source: Arc<V>,
}

impl<V: VersionSource + ?Sized + 'static> FreshnessProbe<V> {
    pub fn new(source: Arc<V>) -> Self {
        Self { source }
    }

    /// Polls `resource_keys` every `poll_interval` and calls `on_change` with
    /// the changed keys at most once per poll.
    pub fn watch<F>(
        &self,
        resource_keys: Vec<String>,
        poll_interval: Duration,
        on_change: F,
    ) -> Result<ProbeHandle, SyncError>
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        if poll_interval.is_zero() {
            return Err(SyncError::InvalidInterval);
        }

        let id = Uuid::new_v4();
        let token = LifecycleToken::new();
        let status = Arc::new(Mutex::new(ProbeStatus {
            id:   Some(id),
            keys: resource_keys.clone(),
            ..Default::default()
        }));

        info!(
            probe       = %id,
            keys        = ?resource_keys,
            interval_ms = poll_interval.as_millis() as u64,
            "🔎 Freshness probe watching"
        );

        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            resource_keys,
            poll_interval,
            on_change,
            token.clone(),
            Arc::clone(&status),
        ));

        Ok(ProbeHandle { id, token, task, status })
    }

    /// Stops the probe and waits until a running `on_change` has returned.
    pub async fn unwatch(&self, handle: ProbeHandle) {
        handle.token.cancel().await;
        info!(probe = %handle.id, "Freshness probe stopped");
        drop(handle);
    }
}

async fn poll_loop<V, F>(
    source: Arc<V>,
    keys: Vec<String>,
    poll_interval: Duration,
    on_change: F,
    token: LifecycleToken,
    status: Arc<Mutex<ProbeStatus>>,
) where
    V: VersionSource + ?Sized,
    F: Fn(Vec<String>) + Send + Sync + 'static,
{
    let mut ledger = VersionLedger::new(keys.clone());
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if token.is_cancelled() {
            break;
        }

        let result = source.fetch_versions(&keys).await;
        let changed = {
            let mut snapshot = status.lock().unwrap_or_else(PoisonError::into_inner);
            snapshot.polls += 1;
            snapshot.last_poll_at = Some(Utc::now());

            match result {
                Ok(versions) => {
                    let changed = ledger.observe(&versions);
                    snapshot.last_error = None;
                    if !changed.is_empty() {
                        snapshot.changes_fired += 1;
                        snapshot.last_change = changed.clone();
                    }
                    Some(changed)
                }
                Err(e) => {
                    snapshot.failures += 1;
                    snapshot.last_error = Some(e.to_string());
                    warn!(error = %e, "Version check failed — ledger left unchanged");
                    None
                }
            }
        };

        let Some(changed) = changed else {
            continue;
        };
        if changed.is_empty() {
            debug!(keys = ?keys, "No resource changes");
            continue;
        }

        info!(changed = ?changed, "♻️ Resources changed — requesting refresh");
        let on_change = &on_change;
        token.run_if_live(async move { on_change(changed) }).await;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
