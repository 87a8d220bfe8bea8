//! # models::bar
//!
//! Defines [`PriceBar`], one OHLCV sample from the bar-series endpoint.
//!
//! Bars are immutable once validated and are consumed by exactly one overlay
//! compilation; nothing shares them across views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::wire::{self, PayloadError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open:      f64,
    pub high:      f64,
    pub low:       f64,
    pub close:     f64,
    pub volume:    f64,
}

impl PriceBar {
    /// `close >= open`, i.e. the bar closed flat or up.
    #[inline]
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }

    /// `true` when every price field is a finite number.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
    }

    /// Validates one raw bar.  Accepts `timestamp` / `time` / `date` / `t` as
    /// the time field; `volume` defaults to `0.0` when absent.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let raw_time = ["timestamp", "time", "date", "t"]
            .iter()
            .find_map(|f| object.get(*f).filter(|v| !v.is_null()))
            .ok_or(PayloadError::MissingField("timestamp"))?;

        let timestamp = wire::timestamp(raw_time).ok_or_else(|| PayloadError::InvalidField {
            field: "timestamp",
            value: raw_time.to_string(),
        })?;

        Ok(Self {
            timestamp,
            open:   wire::required_number(object, "open")?,
            high:   wire::required_number(object, "high")?,
            low:    wire::required_number(object, "low")?,
            close:  wire::required_number(object, "close")?,
            volume: wire::optional_number(object, "volume")?.unwrap_or(0.0),
        })
    }

    /// Validates a whole series, skipping malformed bars.
    pub fn parse_series(values: &[Value]) -> Vec<Self> {
        values
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| match Self::from_value(raw) {
                Ok(bar) => Some(bar),
                Err(e) => {
                    warn!(index, error = %e, "Malformed bar — skipped");
                    None
                }
            })
            .collect()
    }
}

/// Wire shape of the bar-series endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct BarsPayload {
    #[serde(default)]
    pub bars: Vec<Value>,
}
