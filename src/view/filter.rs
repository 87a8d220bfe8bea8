//! # view::filter
//!
//! Read-only projections of a view's working set.  Filtering and sorting
//! never touch the records themselves; a refresh or price tick arriving
//! mid-filter simply shows up in the next projection.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::Serialize;

use crate::models::{PayloadError, SignalRecord, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Highest score first.
    Score,
    /// Highest live return first.
    Return,
    /// Alphabetical.
    Ticker,
    /// Most recent signal first.
    Date,
}

impl FromStr for SortKey {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "score" => Ok(SortKey::Score),
            "return" | "return_pct" => Ok(SortKey::Return),
            "ticker" | "symbol" => Ok(SortKey::Ticker),
            "date" | "signal_date" => Ok(SortKey::Date),
            other => Err(PayloadError::InvalidField {
                field: "sort",
                value: other.to_string(),
            }),
        }
    }
}

/// Client-side filter over one view.  `Default` matches everything and keeps
/// backend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalFilter {
    pub timeframe: Option<Timeframe>,
    pub min_score: Option<f64>,
    /// Case-insensitive ticker substring.
    pub query:     Option<String>,
    pub sort:      Option<SortKey>,
}

impl SignalFilter {
    pub fn matches(&self, record: &SignalRecord) -> bool {
        if self.timeframe.is_some_and(|tf| tf != record.timeframe) {
            return false;
        }
        if self.min_score.is_some_and(|min| record.score < min) {
            return false;
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => record
                .ticker
                .to_ascii_lowercase()
                .contains(&q.to_ascii_lowercase()),
            _ => true,
        }
    }

    pub fn apply(&self, records: &[SignalRecord]) -> Vec<SignalRecord> {
        let mut visible: Vec<SignalRecord> =
            records.iter().filter(|r| self.matches(r)).cloned().collect();

        // Stable sort: ties keep backend order.
        match self.sort {
            Some(SortKey::Score) => visible.sort_by(|a, b| desc(a.score, b.score)),
            Some(SortKey::Return) => visible.sort_by(|a, b| desc(a.return_pct, b.return_pct)),
            Some(SortKey::Ticker) => visible.sort_by(|a, b| a.ticker.cmp(&b.ticker)),
            Some(SortKey::Date) => visible.sort_by(|a, b| b.signal_date.cmp(&a.signal_date)),
            None => {}
        }
        visible
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(ticker: &str, score: f64, return_pct: f64, timeframe: Timeframe, day: u32) -> SignalRecord {
        SignalRecord {
            ticker: ticker.to_string(),
            signal_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            entry_price: 10.0,
            current_price: 10.0,
            return_pct,
            score,
            timeframe,
            pivot_price: 0.0,
            ml_win_prob: None,
            realized_return_pct: None,
            pattern: None,
            created_at: None,
        }
    }

    fn sample() -> Vec<SignalRecord> {
        vec![
            record("NVDA", 90.0, 4.0, Timeframe::D1, 3),
            record("AAPL", 70.0, 9.0, Timeframe::H4, 5),
            record("AMD", 85.0, -2.0, Timeframe::D1, 1),
        ]
    }

    #[test]
    fn test_default_filter_is_identity() {
        let records = sample();
        assert_eq!(SignalFilter::default().apply(&records), records);
    }

    #[test]
    fn test_filters_combine() {
        let filter = SignalFilter {
            timeframe: Some(Timeframe::D1),
            min_score: Some(86.0),
            ..Default::default()
        };
        let out = filter.apply(&sample());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ticker, "NVDA");

        let by_query = SignalFilter {
            query: Some("a".into()),
            ..Default::default()
        };
        let tickers: Vec<_> = by_query.apply(&sample()).into_iter().map(|r| r.ticker).collect();
        assert_eq!(tickers, vec!["NVDA", "AAPL", "AMD"]);
    }

    #[test]
    fn test_sort_keys() {
        let tickers = |sort| {
            SignalFilter { sort: Some(sort), ..Default::default() }
                .apply(&sample())
                .into_iter()
                .map(|r| r.ticker)
                .collect::<Vec<_>>()
        };
        assert_eq!(tickers(SortKey::Score), vec!["NVDA", "AMD", "AAPL"]);
        assert_eq!(tickers(SortKey::Return), vec!["AAPL", "NVDA", "AMD"]);
        assert_eq!(tickers(SortKey::Ticker), vec!["AAPL", "AMD", "NVDA"]);
        assert_eq!(tickers(SortKey::Date), vec!["AAPL", "NVDA", "AMD"]);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("Return".parse::<SortKey>().unwrap(), SortKey::Return);
        assert!("volume".parse::<SortKey>().is_err());
    }
}
