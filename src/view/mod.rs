//! # view: View Controller
//!
//! One [`ViewController`] per dashboard view (`vcp`, `flow`, `macro`, ...).
//! It owns the view's working set and wires the engine together:
//!
//! ```text
//!   {view}:signals  ── every refresh_interval ─▶ fetch_signals ─▶ replace working set
//!   {view}:prices   ── every price_interval ───▶ fetch_prices  ─▶ reconcile into working set
//!   probe(keys)     ── every probe_interval ───▶ fetch_versions ─▶ changed? trigger {view}:signals
//!
//!   open_chart(ticker) ─▶ fetch_bars ─▶ compile ─▶ ChartSpec
//! ```
//!
//! All three registrations are owned by the controller.  [`ViewController::shutdown`]
//! (or dropping the controller) releases them; no callback mutates the
//! working set after `shutdown` returns.

pub mod filter;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::client::SignalBackend;
use crate::engine::{
    compile, reconcile, reconciler, FreshnessProbe, ProbeHandle, ProbeStatus, RefreshJob,
    RefreshScheduler, SourceHandle, SourceOptions, SourceStatus,
};
use crate::error::SyncError;
use crate::events::{DeckEvent, PriceUpdate};
use crate::models::{ChartSpec, SignalList, SignalRecord};

pub use filter::{SignalFilter, SortKey};

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    pub name:             String,
    /// Keys watched by the freshness probe.  A change to any of them triggers
    /// a full signal refresh.
    pub resource_keys:    Vec<String>,
    pub refresh_interval: Duration,
    pub price_interval:   Duration,
    pub probe_interval:   Duration,
    /// How many bars `open_chart` asks the backend for.
    pub chart_bar_limit:  usize,
    pub fetch_timeout:    Option<Duration>,
}

impl ViewConfig {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            resource_keys:    vec![name.clone()],
            name,
            refresh_interval: Duration::from_secs(300),
            price_interval:   Duration::from_secs(30),
            probe_interval:   Duration::from_secs(60),
            chart_bar_limit:  200,
            fetch_timeout:    None,
        }
    }

    pub fn signals_source(&self) -> String {
        format!("{}:signals", self.name)
    }

    pub fn prices_source(&self) -> String {
        format!("{}:prices", self.name)
    }
}

// ─── State ────────────────────────────────────────────────────────────────────

/// The view's working set plus refresh bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub records:              Vec<SignalRecord>,
    pub generated_at:         Option<DateTime<Utc>>,
    pub last_full_refresh_at: Option<DateTime<Utc>>,
    pub last_price_at:        Option<DateTime<Utc>>,
}

/// Freshness summary served to the dashboard's stale-data indicator.
#[derive(Debug, Clone, Serialize)]
pub struct ViewStatus {
    pub view:                 String,
    pub running:              bool,
    pub record_count:         usize,
    pub generated_at:         Option<DateTime<Utc>>,
    pub last_full_refresh_at: Option<DateTime<Utc>>,
    pub last_price_at:        Option<DateTime<Utc>>,
    /// Never loaded, or the latest fetch of any source failed.
    pub stale:                bool,
    pub sources:              Vec<SourceStatus>,
    pub probe:                Option<ProbeStatus>,
}

/// A compiled chart together with the signal it was compiled for.
#[derive(Debug, Clone, Serialize)]
pub struct OpenedChart {
    pub symbol: String,
    pub signal: SignalRecord,
    pub chart:  ChartSpec,
}

struct ViewHandles {
    signals: SourceHandle,
    prices:  SourceHandle,
    probe:   ProbeHandle,
}

fn publish(events: &broadcast::Sender<String>, event: &DeckEvent) {
    // Err only means nobody is listening.
    let _ = events.send(event.to_json());
}

// ─── Jobs ─────────────────────────────────────────────────────────────────────

struct SignalsRefresh {
    view:    String,
    backend: Arc<dyn SignalBackend>,
    state:   Arc<RwLock<ViewState>>,
    events:  broadcast::Sender<String>,
}

#[async_trait]
impl RefreshJob for SignalsRefresh {
    type Output = SignalList;

    async fn fetch(&self) -> Result<SignalList, SyncError> {
        self.backend.fetch_signals(&self.view).await
    }

    async fn apply(&self, list: SignalList) {
        let count = list.records.len();
        {
            let mut state = self.state.write().await;
            state.records = list.records;
            state.generated_at = list.generated_at;
            state.last_full_refresh_at = Some(Utc::now());
        }

        info!(view = %self.view, count, skipped = list.skipped, "✅ Signals refreshed");
        publish(
            &self.events,
            &DeckEvent::SignalsReplaced {
                view:         self.view.clone(),
                count,
                skipped:      list.skipped,
                generated_at: list.generated_at,
            },
        );
    }

    async fn on_error(&self, error: SyncError) {
        publish(
            &self.events,
            &DeckEvent::RefreshFailed {
                view:   self.view.clone(),
                source: "signals".into(),
                error:  error.to_string(),
            },
        );
    }
}

struct PriceTicks {
    view:    String,
    backend: Arc<dyn SignalBackend>,
    state:   Arc<RwLock<ViewState>>,
    events:  broadcast::Sender<String>,
}

#[async_trait]
impl RefreshJob for PriceTicks {
    type Output = HashMap<String, f64>;

    async fn fetch(&self) -> Result<HashMap<String, f64>, SyncError> {
        let tickers = reconciler::tickers(&self.state.read().await.records);
        self.backend.fetch_prices(&tickers).await
    }

    async fn apply(&self, prices: HashMap<String, f64>) {
        if prices.is_empty() {
            return;
        }

        // Reconciled against whatever the working set holds now, which may be
        // newer than the set the tickers were taken from.
        let updates: Vec<PriceUpdate> = {
            let mut state = self.state.write().await;
            let reconciled = reconcile(&state.records, &prices);
            state.records = reconciled;
            state.last_price_at = Some(Utc::now());
            state
                .records
                .iter()
                .filter(|r| prices.contains_key(&r.ticker))
                .map(|r| PriceUpdate {
                    ticker:        r.ticker.clone(),
                    signal_date:   r.signal_date,
                    current_price: r.current_price,
                    return_pct:    r.return_pct,
                })
                .collect()
        };

        if updates.is_empty() {
            return;
        }
        publish(
            &self.events,
            &DeckEvent::PricesReconciled {
                view: self.view.clone(),
                updates,
            },
        );
    }

    async fn on_error(&self, error: SyncError) {
        publish(
            &self.events,
            &DeckEvent::RefreshFailed {
                view:   self.view.clone(),
                source: "prices".into(),
                error:  error.to_string(),
            },
        );
    }
}

// ─── Controller ───────────────────────────────────────────────────────────────

pub struct ViewController {
    config:    ViewConfig,
    backend:   Arc<dyn SignalBackend>,
    scheduler: RefreshScheduler,
    probe:     FreshnessProbe<dyn SignalBackend>,
    state:     Arc<RwLock<ViewState>>,
    events:    broadcast::Sender<String>,
    handles:   Mutex<Option<ViewHandles>>,
}

impl ViewController {
    /// Registers the view's signal and price sources and starts its probe.
    /// The first signal fetch runs immediately.
    pub fn start(
        config: ViewConfig,
        backend: Arc<dyn SignalBackend>,
        scheduler: RefreshScheduler,
        events: broadcast::Sender<String>,
    ) -> Result<Self, SyncError> {
        let state = Arc::new(RwLock::new(ViewState::default()));
        let options = SourceOptions {
            timeout: config.fetch_timeout,
        };

        let signals = scheduler.register_with(
            config.signals_source(),
            config.refresh_interval,
            SignalsRefresh {
                view:    config.name.clone(),
                backend: Arc::clone(&backend),
                state:   Arc::clone(&state),
                events:  events.clone(),
            },
            options,
        )?;

        let prices = scheduler.register_with(
            config.prices_source(),
            config.price_interval,
            PriceTicks {
                view:    config.name.clone(),
                backend: Arc::clone(&backend),
                state:   Arc::clone(&state),
                events:  events.clone(),
            },
            options,
        )?;

        let probe = FreshnessProbe::new(Arc::clone(&backend));
        let probe_handle = {
            let trigger = signals.refresh_trigger();
            let events = events.clone();
            let view = config.name.clone();
            probe.watch(config.resource_keys.clone(), config.probe_interval, move |keys| {
                publish(&events, &DeckEvent::ResourcesChanged { view: view.clone(), keys });
                trigger.fire();
            })?
        };

        info!(
            view     = %config.name,
            keys     = ?config.resource_keys,
            refresh  = ?config.refresh_interval,
            prices   = ?config.price_interval,
            probe    = ?config.probe_interval,
            "🖥️ View started"
        );

        Ok(Self {
            config,
            backend,
            scheduler,
            probe,
            state,
            events,
            handles: Mutex::new(Some(ViewHandles {
                signals,
                prices,
                probe: probe_handle,
            })),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn handles(&self) -> MutexGuard<'_, Option<ViewHandles>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.handles().is_some()
    }

    /// Snapshot of the full working set in backend order.
    pub async fn records(&self) -> Vec<SignalRecord> {
        self.state.read().await.records.clone()
    }

    pub async fn visible(&self, filter: &SignalFilter) -> Vec<SignalRecord> {
        filter.apply(&self.state.read().await.records)
    }

    /// Finds the signal for `ticker` (the most recent one unless
    /// `signal_date` pins it), fetches its bars and compiles the chart.
    pub async fn open_chart(
        &self,
        ticker: &str,
        signal_date: Option<NaiveDate>,
    ) -> Result<OpenedChart, SyncError> {
        let signal = {
            let state = self.state.read().await;
            state
                .records
                .iter()
                .filter(|r| r.ticker.eq_ignore_ascii_case(ticker))
                .filter(|r| signal_date.map_or(true, |d| r.signal_date == d))
                .max_by_key(|r| r.signal_date)
                .cloned()
        }
        .ok_or_else(|| SyncError::NotFound(format!("no `{ticker}` signal in view `{}`", self.config.name)))?;

        let bars = self
            .backend
            .fetch_bars(&signal.ticker, signal.timeframe, self.config.chart_bar_limit)
            .await?;
        let chart = compile(&bars, &signal.descriptor());

        info!(
            view    = %self.config.name,
            ticker  = %signal.ticker,
            bars    = bars.len(),
            candles = chart.candles.len(),
            "📈 Chart compiled"
        );

        Ok(OpenedChart {
            symbol: signal.ticker.clone(),
            signal,
            chart,
        })
    }

    pub async fn status(&self) -> ViewStatus {
        let running = self.is_running();
        let (sources, probe) = match self.handles().as_ref() {
            Some(h) => (
                vec![h.signals.status(), h.prices.status()],
                Some(h.probe.status()),
            ),
            None => (Vec::new(), None),
        };
        let state = self.state.read().await;

        let never_loaded = state.last_full_refresh_at.is_none();
        let failing = sources.iter().any(|s| s.consecutive_failures > 0);

        ViewStatus {
            view:                 self.config.name.clone(),
            running,
            record_count:         state.records.len(),
            generated_at:         state.generated_at,
            last_full_refresh_at: state.last_full_refresh_at,
            last_price_at:        state.last_price_at,
            stale:                never_loaded || failing,
            sources,
            probe,
        }
    }

    /// Manual refresh.  Returns `false` once the view has been shut down.
    pub fn refresh_now(&self) -> bool {
        match self.handles().as_ref() {
            Some(h) => {
                h.signals.trigger();
                true
            }
            None => false,
        }
    }

    /// Stops every source and the probe of this view.  Idempotent.
    pub async fn shutdown(&self) {
        let taken = self.handles().take();
        let Some(handles) = taken else {
            return;
        };

        self.scheduler.unregister(handles.signals).await;
        self.scheduler.unregister(handles.prices).await;
        self.probe.unwatch(handles.probe).await;

        info!(view = %self.config.name, "🛑 View stopped");
        publish(
            &self.events,
            &DeckEvent::ViewStopped {
                view: self.config.name.clone(),
            },
        );
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
