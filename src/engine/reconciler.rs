//! # engine::reconciler
//!
//! **Price Reconciler**: merges a ticker → price map into an existing record
//! list without replacing record identity.
//!
//! Only two fields ever change: `current_price`, and `return_pct` when the
//! record has a known entry price.  Records are never added, removed or
//! reordered, and the input slice is never mutated.

use std::collections::{HashMap, HashSet};

use crate::models::SignalRecord;

/// Applies `prices` to `records`, returning the updated list.
///
/// Idempotent: `reconcile(&reconcile(r, p), p) == reconcile(r, p)`.
pub fn reconcile(records: &[SignalRecord], prices: &HashMap<String, f64>) -> Vec<SignalRecord> {
    records
        .iter()
        .map(|record| match prices.get(&record.ticker) {
            Some(&price) => apply_price(record, price),
            None => record.clone(),
        })
        .collect()
}

fn apply_price(record: &SignalRecord, price: f64) -> SignalRecord {
    let mut updated = record.clone();
    updated.current_price = price;
    // entry_price == 0 means unknown; return_pct keeps its last value.
    if updated.entry_price > 0.0 {
        updated.return_pct = (price - updated.entry_price) / updated.entry_price * 100.0;
    }
    updated
}

/// Distinct tickers in first-seen order; the body of a price-tick request.
pub fn tickers(records: &[SignalRecord]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|r| seen.insert(r.ticker.as_str()))
        .map(|r| r.ticker.clone())
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use chrono::NaiveDate;

    fn record(ticker: &str, entry_price: f64, current_price: f64, return_pct: f64) -> SignalRecord {
        SignalRecord {
            ticker: ticker.to_string(),
            signal_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            entry_price,
            current_price,
            return_pct,
            score: 80.0,
            timeframe: Timeframe::D1,
            pivot_price: 0.0,
            ml_win_prob: None,
            realized_return_pct: None,
            pattern: None,
            created_at: None,
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn test_btc_tick_recomputes_return() {
        let records = vec![record("BTC/USDT", 100.0, 100.0, 0.0)];
        let out = reconcile(&records, &prices(&[("BTC/USDT", 110.0)]));
        assert_eq!(out[0].current_price, 110.0);
        assert!((out[0].return_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_entry_price_keeps_return() {
        let records = vec![record("AAPL", 0.0, 180.0, 7.5)];
        let out = reconcile(&records, &prices(&[("AAPL", 200.0)]));
        assert_eq!(out[0].current_price, 200.0);
        assert_eq!(out[0].return_pct, 7.5);
    }

    #[test]
    fn test_unmatched_records_pass_through_in_order() {
        let records = vec![
            record("AAPL", 10.0, 10.0, 0.0),
            record("MSFT", 20.0, 21.0, 5.0),
            record("NVDA", 30.0, 30.0, 0.0),
        ];
        let out = reconcile(&records, &prices(&[("NVDA", 33.0), ("TSLA", 1.0)]));

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], records[0]);
        assert_eq!(out[1], records[1]);
        assert_eq!(out[2].ticker, "NVDA");
        assert!((out[2].return_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let records = vec![record("AAPL", 10.0, 10.0, 0.0)];
        let snapshot = records.clone();
        let _ = reconcile(&records, &prices(&[("AAPL", 12.0)]));
        assert_eq!(records, snapshot);
    }

    #[test]
    fn test_idempotent() {
        let records = vec![
            record("AAPL", 10.0, 10.0, 0.0),
            record("MSFT", 0.0, 21.0, 3.0),
            record("AAPL", 8.0, 9.0, 12.5),
            record("NVDA", 30.0, 31.0, 3.3),
        ];
        let p = prices(&[("AAPL", 11.37), ("MSFT", 19.0)]);
        let once = reconcile(&records, &p);
        let twice = reconcile(&once, &p);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_realized_return_untouched() {
        let mut closed = record("AMD", 50.0, 60.0, 20.0);
        closed.realized_return_pct = Some(18.0);
        let out = reconcile(&[closed], &prices(&[("AMD", 40.0)]));
        assert_eq!(out[0].realized_return_pct, Some(18.0));
        assert!((out[0].return_pct + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_tickers_deduplicated_in_order() {
        let records = vec![
            record("MSFT", 1.0, 1.0, 0.0),
            record("AAPL", 1.0, 1.0, 0.0),
            record("MSFT", 2.0, 2.0, 0.0),
        ];
        assert_eq!(tickers(&records), vec!["MSFT".to_string(), "AAPL".to_string()]);
    }
}
