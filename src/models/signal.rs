//! # models::signal
//!
//! Defines [`SignalRecord`], one tracked trading signal in a view's working
//! set, and the validation step that turns a loosely shaped backend payload
//! into a total, typed record.
//!
//! ## Two return fields
//!
//! * `return_pct` is the **live** return, recomputed by the price reconciler
//!   whenever a fresh tick arrives and `entry_price > 0`.
//! * `realized_return_pct` is the backend-persisted final return of a closed
//!   position.  The core carries it through untouched and never merges the two.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::wire::{self, PayloadError};

// ─── Timeframe ────────────────────────────────────────────────────────────────

/// Bar bucket size a signal was detected on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[default]
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1  => "1h",
            Timeframe::H4  => "4h",
            Timeframe::D1  => "1d",
            Timeframe::W1  => "1w",
        }
    }

    /// Daily and coarser bars live on a calendar-date axis; everything finer
    /// keeps its full timestamp.
    #[inline]
    pub fn is_daily(&self) -> bool {
        matches!(self, Timeframe::D1 | Timeframe::W1)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "15m" | "15min" => Ok(Timeframe::M15),
            "30m" | "30min" => Ok(Timeframe::M30),
            "1h" | "60m"    => Ok(Timeframe::H1),
            "4h" | "240m"   => Ok(Timeframe::H4),
            "1d" | "d" | "daily" => Ok(Timeframe::D1),
            "1w" | "w" | "weekly" => Ok(Timeframe::W1),
            other => Err(PayloadError::InvalidField {
                field: "timeframe",
                value: other.to_string(),
            }),
        }
    }
}

// ─── SignalKey ────────────────────────────────────────────────────────────────

/// Identity of a record inside one view's working set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalKey {
    pub ticker:      String,
    pub signal_date: NaiveDate,
}

// ─── SignalRecord ─────────────────────────────────────────────────────────────

/// One tracked trading signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Instrument symbol, e.g. `"BTC/USDT"` or `"NVDA"`.
    pub ticker: String,

    /// Date the pattern was detected.  Together with `ticker` forms the identity.
    pub signal_date: NaiveDate,

    /// Price at detection.  `0.0` means unknown and disables return computation.
    pub entry_price: f64,

    /// Latest known price; updated on every reconciled tick.
    pub current_price: f64,

    /// Live return in percent, derived from `entry_price` and `current_price`.
    pub return_pct: f64,

    /// Backend score.  Opaque to the core; only used for filtering / sorting.
    pub score: f64,

    pub timeframe: Timeframe,

    /// Breakout reference level.  `0.0` means "no pivot".
    pub pivot_price: f64,

    /// ML win probability in percent (0–100).
    pub ml_win_prob: Option<f64>,

    /// Final return persisted by the backend for closed positions.
    #[serde(default)]
    pub realized_return_pct: Option<f64>,

    /// Pattern family label, e.g. `"VCP"`.
    #[serde(default)]
    pub pattern: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SignalRecord {
    pub fn key(&self) -> SignalKey {
        SignalKey {
            ticker:      self.ticker.clone(),
            signal_date: self.signal_date,
        }
    }

    /// The subset of fields the overlay compiler needs.
    pub fn descriptor(&self) -> SignalDescriptor {
        SignalDescriptor {
            pivot_price: self.pivot_price,
            timeframe:   self.timeframe,
            ml_win_prob: self.ml_win_prob,
        }
    }

    /// Validates one raw signal object from the signal list endpoint.
    ///
    /// Missing optional fields are defaulted here and nowhere else:
    /// prices default to `0.0`, `current_price` falls back to `entry_price`,
    /// `timeframe` to `1d` and `signal_date` to the date part of `created_at`.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let ticker = wire::string_field(object, &["ticker", "symbol"])
            .ok_or(PayloadError::MissingField("ticker"))?
            .to_string();

        let created_at = wire::string_field(object, &["created_at"])
            .and_then(wire::parse_datetime);

        let signal_date = match wire::string_field(object, &["signal_date", "date"]) {
            Some(raw) => wire::parse_date(raw).ok_or_else(|| PayloadError::InvalidField {
                field: "signal_date",
                value: raw.to_string(),
            })?,
            None => created_at
                .map(|dt| dt.date_naive())
                .ok_or(PayloadError::MissingField("signal_date"))?,
        };

        let timeframe = match wire::string_field(object, &["timeframe", "interval"]) {
            Some(raw) => raw.parse()?,
            None => Timeframe::default(),
        };

        let entry_price = non_negative(wire::optional_number(object, "entry_price")?);
        let current_price = wire::optional_number(object, "current_price")?
            .map(|p| p.max(0.0))
            .unwrap_or(entry_price);
        let pivot_price = non_negative(wire::optional_number(object, "pivot_price")?);

        let return_pct = match wire::optional_number(object, "return_pct")? {
            Some(r) => r,
            None if entry_price > 0.0 => (current_price - entry_price) / entry_price * 100.0,
            None => 0.0,
        };

        let ml_win_prob = wire::optional_number(object, "ml_win_prob")?
            .map(|p| p.clamp(0.0, 100.0));

        Ok(Self {
            ticker,
            signal_date,
            entry_price,
            current_price,
            return_pct,
            score: wire::optional_number(object, "score")?.unwrap_or(0.0),
            timeframe,
            pivot_price,
            ml_win_prob,
            realized_return_pct: wire::optional_number(object, "realized_return_pct")?,
            pattern: wire::string_field(object, &["pattern", "pattern_type"]).map(str::to_string),
            created_at,
        })
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    value.map(|v| v.max(0.0)).unwrap_or(0.0)
}

// ─── SignalDescriptor ─────────────────────────────────────────────────────────

/// Input of the overlay compiler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    pub pivot_price: f64,
    pub timeframe:   Timeframe,
    pub ml_win_prob: Option<f64>,
}

// ─── SignalList ───────────────────────────────────────────────────────────────

/// Wire shape of the signal list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SignalsPayload {
    #[serde(default)]
    pub signals: Vec<Value>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

/// A validated batch from the signal list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalList {
    pub records:      Vec<SignalRecord>,
    pub generated_at: Option<DateTime<Utc>>,
    /// How many raw entries were dropped as malformed or duplicate.
    pub skipped:      usize,
}

impl SignalList {
    /// Validates every entry independently.  Malformed entries and repeated
    /// `(ticker, signal_date)` identities are dropped; order is preserved.
    pub fn from_payload(payload: SignalsPayload) -> Self {
        let mut seen = HashSet::with_capacity(payload.signals.len());
        let mut records = Vec::with_capacity(payload.signals.len());
        let mut skipped = 0;

        for (index, raw) in payload.signals.iter().enumerate() {
            match SignalRecord::from_value(raw) {
                Ok(record) => {
                    if seen.insert(record.key()) {
                        records.push(record);
                    } else {
                        warn!(index, ticker = %record.ticker, date = %record.signal_date, "Duplicate signal identity — skipped");
                        skipped += 1;
                    }
                }
                Err(e) => {
                    warn!(index, error = %e, "Malformed signal — skipped");
                    skipped += 1;
                }
            }
        }

        Self {
            records,
            generated_at: payload.generated_at.as_deref().and_then(wire::parse_datetime),
            skipped,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_record_parses() {
        let record = SignalRecord::from_value(&json!({
            "ticker": "NVDA",
            "signal_date": "2024-05-02",
            "entry_price": 100.0,
            "current_price": "105.5",
            "score": 87,
            "timeframe": "4h",
            "pivot_price": 98.0,
            "ml_win_prob": 62.5,
            "pattern": "VCP"
        }))
        .unwrap();

        assert_eq!(record.ticker, "NVDA");
        assert_eq!(record.signal_date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(record.current_price, 105.5);
        assert_eq!(record.timeframe, Timeframe::H4);
        assert_eq!(record.ml_win_prob, Some(62.5));
        assert!((record.return_pct - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_defaults_applied_once() {
        let record = SignalRecord::from_value(&json!({
            "symbol": "BTC/USDT",
            "created_at": "2024-01-03T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.signal_date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(record.entry_price, 0.0);
        assert_eq!(record.current_price, 0.0);
        assert_eq!(record.return_pct, 0.0);
        assert_eq!(record.timeframe, Timeframe::D1);
        assert_eq!(record.ml_win_prob, None);
    }

    #[test]
    fn test_missing_identity_rejected() {
        let err = SignalRecord::from_value(&json!({ "ticker": "AAPL" })).unwrap_err();
        assert_eq!(err, PayloadError::MissingField("signal_date"));

        let err = SignalRecord::from_value(&json!({ "signal_date": "2024-01-01" })).unwrap_err();
        assert_eq!(err, PayloadError::MissingField("ticker"));
    }

    #[test]
    fn test_non_numeric_price_rejected() {
        let err = SignalRecord::from_value(&json!({
            "ticker": "AAPL",
            "signal_date": "2024-01-01",
            "entry_price": "n/a"
        }))
        .unwrap_err();
        assert!(matches!(err, PayloadError::InvalidField { field: "entry_price", .. }));
    }

    #[test]
    fn test_batch_keeps_good_entries_and_drops_duplicates() {
        let payload = SignalsPayload {
            signals: vec![
                json!({ "ticker": "AAPL", "signal_date": "2024-01-01" }),
                json!("garbage"),
                json!({ "ticker": "AAPL", "signal_date": "2024-01-01", "score": 99 }),
                json!({ "ticker": "MSFT", "signal_date": "2024-01-01" }),
            ],
            generated_at: Some("2024-01-01T08:00:00Z".into()),
        };

        let list = SignalList::from_payload(payload);
        let tickers: Vec<_> = list.records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(list.records[0].score, 0.0);
        assert_eq!(list.skipped, 2);
        assert!(list.generated_at.is_some());
    }

    #[test]
    fn test_timeframe_aliases() {
        assert_eq!("60m".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert_eq!("Daily".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert!("3d".parse::<Timeframe>().is_err());
        assert!(Timeframe::W1.is_daily());
        assert!(!Timeframe::H4.is_daily());
    }
}
