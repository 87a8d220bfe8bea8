//! Axum route handlers for the dashboard gateway.

pub mod monitor;
pub mod views;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::SharedState;

/// Every gateway route, without middleware.
pub fn router(state: SharedState) -> Router {
    Router::new()
        // ── Views ─────────────────────────────────────────────────────────────
        .route("/api/health",                    get(views::health_check))
        .route("/api/views",                     get(views::list_views))
        .route("/api/views/:view/signals",       get(views::get_signals))
        .route("/api/views/:view/status",        get(views::get_status))
        .route("/api/views/:view/refresh",       post(views::refresh_view))
        .route("/api/views/:view/chart/:ticker", get(views::get_chart))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",                    get(monitor::ws_monitor))
        .with_state(state)
}
