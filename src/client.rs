//! # client: analytics backend client
//!
//! [`SignalBackend`] is the seam between the sync engine and the analytics
//! backend.  [`HttpBackend`] implements it over the backend's four JSON
//! endpoints:
//!
//! | Method | Path                                   | Returns                        |
//! |--------|----------------------------------------|--------------------------------|
//! | GET    | `/api/signals/{view}`                  | `{ signals, generated_at }`    |
//! | GET    | `/api/prices?tickers=A,B`              | `{ prices: { A: 1.0 } }`       |
//! | GET    | `/api/bars?symbol=S&timeframe=1d&limit=N` | `{ bars: [...] }`           |
//! | GET    | `/api/versions?keys=a,b`               | `{ versions: { a: <token> } }` |
//!
//! Item-level validation happens here, once, so everything past this module
//! works with total typed values.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::VersionSource;
use crate::error::SyncError;
use crate::models::bar::BarsPayload;
use crate::models::signal::SignalsPayload;
use crate::models::version::VersionsPayload;
use crate::models::{wire, PriceBar, ResourceVersion, SignalList, Timeframe};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Per-request ceiling applied by the HTTP client itself.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ─── Trait ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SignalBackend: VersionSource {
    async fn fetch_signals(&self, view: &str) -> Result<SignalList, SyncError>;

    /// Latest price per ticker.  Tickers the backend has no price for are
    /// simply absent from the map.
    async fn fetch_prices(&self, tickers: &[String]) -> Result<HashMap<String, f64>, SyncError>;

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<PriceBar>, SyncError>;
}

// ─── HttpBackend ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct PricesPayload {
    #[serde(default)]
    prices: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client:   reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BACKEND_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, ?query, "GET backend");

        let resp = self
            .client
            .get(&url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Status { status, body });
        }

        resp.json::<T>().await.map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[async_trait]
impl VersionSource for HttpBackend {
    async fn fetch_versions(&self, keys: &[String]) -> Result<Vec<ResourceVersion>, SyncError> {
        let payload: VersionsPayload = self
            .get_json("/api/versions", &[("keys", keys.join(","))])
            .await?;
        Ok(payload.into_versions())
    }
}

#[async_trait]
impl SignalBackend for HttpBackend {
    async fn fetch_signals(&self, view: &str) -> Result<SignalList, SyncError> {
        let payload: SignalsPayload = self.get_json(&format!("/api/signals/{view}"), &[]).await?;
        Ok(SignalList::from_payload(payload))
    }

    async fn fetch_prices(&self, tickers: &[String]) -> Result<HashMap<String, f64>, SyncError> {
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }

        let payload: PricesPayload = self
            .get_json("/api/prices", &[("tickers", tickers.join(","))])
            .await?;

        let mut prices = HashMap::with_capacity(payload.prices.len());
        for (ticker, raw) in payload.prices {
            match wire::number(&raw) {
                Some(price) if price >= 0.0 => {
                    prices.insert(ticker, price);
                }
                _ => warn!(ticker = %ticker, value = %raw, "Invalid price tick — skipped"),
            }
        }
        Ok(prices)
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<PriceBar>, SyncError> {
        let payload: BarsPayload = self
            .get_json(
                "/api/bars",
                &[
                    ("symbol", symbol.to_string()),
                    ("timeframe", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(PriceBar::parse_series(&payload.bars))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
