//! # routes::views
//!
//! REST surface over the running views.
//!
//! ## Endpoints
//!
//! | Method | Path                              | Description                                  |
//! |--------|-----------------------------------|----------------------------------------------|
//! | GET    | `/api/health`                     | Liveness plus source count                   |
//! | GET    | `/api/views`                      | Every view with its freshness status         |
//! | GET    | `/api/views/:view/signals`        | Filtered projection of the working set       |
//! | GET    | `/api/views/:view/status`         | Per-source status and stale flag             |
//! | POST   | `/api/views/:view/refresh`        | Manual full refresh                          |
//! | GET    | `/api/views/:view/chart/:ticker`  | Compiled `ChartSpec` for one signal          |

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    error::AppError,
    models::{wire, PayloadError, Timeframe},
    state::SharedState,
    view::{SignalFilter, SortKey},
};

// ─── GET /api/health ──────────────────────────────────────────────────────────

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":          true,
        "status":      "healthy",
        "views":       state.views.len(),
        "sources":     state.scheduler.statuses().len(),
        "server_time": Utc::now(),
    }))
}

// ─── GET /api/views ───────────────────────────────────────────────────────────

pub async fn list_views(State(state): State<SharedState>) -> impl IntoResponse {
    let mut views = Vec::with_capacity(state.views.len());
    for view in state.views.values() {
        views.push(view.status().await);
    }
    Json(json!({
        "ok":    true,
        "views": views,
    }))
}

// ─── GET /api/views/:view/signals ─────────────────────────────────────────────

/// Query string of the signal list.  All fields optional.
///
/// `?timeframe=1d&min_score=70&q=nv&sort=return`
#[derive(Debug, Default, Deserialize)]
pub struct SignalsQuery {
    pub timeframe: Option<String>,
    pub min_score: Option<f64>,
    pub q:         Option<String>,
    pub sort:      Option<String>,
}

impl SignalsQuery {
    fn into_filter(self) -> Result<SignalFilter, AppError> {
        let bad = |e: PayloadError| AppError::BadRequest(e.to_string());
        Ok(SignalFilter {
            timeframe: self.timeframe.as_deref().map(str::parse::<Timeframe>).transpose().map_err(bad)?,
            min_score: self.min_score,
            query:     self.q,
            sort:      self.sort.as_deref().map(str::parse::<SortKey>).transpose().map_err(bad)?,
        })
    }
}

pub async fn get_signals(
    State(state): State<SharedState>,
    Path(view): Path<String>,
    Query(query): Query<SignalsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.view(&view)?;
    let filter = query.into_filter()?;

    let total = view.records().await.len();
    let signals = view.visible(&filter).await;

    Ok(Json(json!({
        "ok":      true,
        "view":    view.name(),
        "total":   total,
        "count":   signals.len(),
        "signals": signals,
    })))
}

// ─── GET /api/views/:view/status ──────────────────────────────────────────────

pub async fn get_status(
    State(state): State<SharedState>,
    Path(view): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.view(&view)?.status().await;
    Ok(Json(json!({
        "ok":     true,
        "status": status,
    })))
}

// ─── POST /api/views/:view/refresh ────────────────────────────────────────────

pub async fn refresh_view(
    State(state): State<SharedState>,
    Path(view): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.view(&view)?;
    if !view.refresh_now() {
        return Err(AppError::BadRequest(format!("view `{}` is stopped", view.name())));
    }

    info!(view = %view.name(), "🔄 Manual refresh requested");
    Ok(Json(json!({
        "ok":        true,
        "view":      view.name(),
        "triggered": true,
    })))
}

// ─── GET /api/views/:view/chart/:ticker ───────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    /// Pins the signal when a ticker has several in the view.
    pub date: Option<String>,
}

pub async fn get_chart(
    State(state): State<SharedState>,
    Path((view, ticker)): Path<(String, String)>,
    Query(query): Query<ChartQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.view(&view)?;
    let signal_date = match query.date.as_deref() {
        Some(raw) => Some(
            wire::parse_date(raw)
                .ok_or_else(|| AppError::BadRequest(format!("invalid date `{raw}`")))?,
        ),
        None => None,
    };

    let opened = view.open_chart(&ticker, signal_date).await?;
    Ok(Json(json!({
        "ok":     true,
        "view":   view.name(),
        "symbol": opened.symbol,
        "signal": opened.signal,
        "chart":  opened.chart,
    })))
}
