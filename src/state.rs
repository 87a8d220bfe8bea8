//! # state
//!
//! The gateway's **shared application state**: every running view, the
//! scheduler they registered with, and the broadcast channel feeding
//! `/ws/monitor`.
//!
//! `Arc<AppState>` is cloned cheaply into every Axum handler via
//! `axum::extract::State`.  The view map is fixed at startup; views change
//! their own working sets internally.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::client::SignalBackend;
use crate::engine::RefreshScheduler;
use crate::error::SyncError;
use crate::view::{ViewConfig, ViewController};

/// Capacity of the event channel.  Slow WebSocket clients skip events
/// beyond this backlog.
const EVENT_BUFFER: usize = 256;

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    /// Running views keyed by name, in name order.
    pub views: BTreeMap<String, Arc<ViewController>>,

    pub scheduler: RefreshScheduler,

    /// Pre-serialized `DeckEvent` JSON for WebSocket clients.
    pub broadcast_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            views:     BTreeMap::new(),
            scheduler: RefreshScheduler::new(),
            broadcast_tx,
        }
    }

    /// Starts one controller per config.  Fails on the first view that cannot
    /// be registered; views started before it are stopped when dropped.
    pub fn start_views(
        &mut self,
        configs: Vec<ViewConfig>,
        backend: Arc<dyn SignalBackend>,
    ) -> Result<(), SyncError> {
        for config in configs {
            let name = config.name.clone();
            let view = ViewController::start(
                config,
                Arc::clone(&backend),
                self.scheduler.clone(),
                self.broadcast_tx.clone(),
            )?;
            self.views.insert(name, Arc::new(view));
        }
        info!(views = ?self.views.keys().collect::<Vec<_>>(), "All views started");
        Ok(())
    }

    pub fn view(&self, name: &str) -> Result<&Arc<ViewController>, SyncError> {
        self.views
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| SyncError::UnknownView(name.to_string()))
    }

    /// Stops every view.  Called once on graceful shutdown.
    pub async fn shutdown(&self) {
        for view in self.views.values() {
            view.shutdown().await;
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

/// Starts every configured view against `backend` and wraps the result for
/// injection into the Axum router.
pub fn build_state(
    configs: Vec<ViewConfig>,
    backend: Arc<dyn SignalBackend>,
) -> Result<SharedState, SyncError> {
    let mut state = AppState::new();
    state.start_views(configs, backend)?;
    Ok(Arc::new(state))
}
