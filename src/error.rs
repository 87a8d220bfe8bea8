//! # error
//!
//! Centralised error types.
//!
//! * [`SyncError`]: everything that can go wrong at the collaborator
//!   boundary (fetches, decoding) and in scheduler / probe bookkeeping.  These
//!   are caught at the scheduler / probe boundary and handed to the caller's
//!   error handler; they never escape `reconcile` or `compile`.
//! * [`AppError`]: what the dashboard gateway returns.  Axum's
//!   `IntoResponse` impl turns it into a structured JSON body so the frontend
//!   always gets a machine-readable response even on failure.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── SyncError ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The backend could not be reached or the connection dropped.
    #[error("backend unreachable: {0}")]
    Http(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected top-level shape.
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// The optional per-source fetch timeout elapsed.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// A live registration already owns this source id.
    #[error("source `{0}` is already registered")]
    DuplicateSource(String),

    #[error("interval must be greater than zero")]
    InvalidInterval,

    #[error("unknown view `{0}`")]
    UnknownView(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown view, or no signal for the requested ticker.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The analytics backend failed while serving this request.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::UnknownView(_) | SyncError::NotFound(_) => AppError::NotFound(err.to_string()),
            SyncError::DuplicateSource(_) | SyncError::InvalidInterval => {
                AppError::Internal(anyhow::Error::new(err))
            }
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
