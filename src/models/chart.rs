//! # models::chart
//!
//! The render contract produced by the overlay compiler.
//!
//! Field names and value shapes follow what a lightweight-charts style
//! frontend consumes directly: daily bars carry a `YYYY-MM-DD` time, intraday
//! bars carry Unix seconds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::signal::Timeframe;

// ─── Time Axis ────────────────────────────────────────────────────────────────

/// Horizontal position of a bar on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeKey {
    /// Calendar-date bucket used for daily and coarser timeframes.
    Day(NaiveDate),
    /// Unix seconds used for intraday timeframes.
    Instant(i64),
}

// ─── Layers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time:  TimeKey,
    pub open:  f64,
    pub high:  f64,
    pub low:   f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeBar {
    pub time:  TimeKey,
    pub value: f64,
    /// Up colour when the bar closed at or above its open, down colour otherwise.
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    Pivot,
    TakeProfit,
    StopLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLine {
    pub price: f64,
    pub role:  LineRole,
    pub style: LineStyle,
    pub color: &'static str,
    pub title: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTier {
    Win,
    Neutral,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityBadge {
    pub tier:  BadgeTier,
    pub value: f64,
}

// ─── ChartSpec ────────────────────────────────────────────────────────────────

/// One compiled chart.  Built once per render and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub timeframe:         Timeframe,
    pub candles:           Vec<Candle>,
    pub volume_bars:       Vec<VolumeBar>,
    pub price_lines:       Vec<PriceLine>,
    pub probability_badge: Option<ProbabilityBadge>,
}

impl ChartSpec {
    pub fn empty(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candles:           Vec::new(),
            volume_bars:       Vec::new(),
            price_lines:       Vec::new(),
            probability_badge: None,
        }
    }

    pub fn line(&self, role: LineRole) -> Option<&PriceLine> {
        self.price_lines.iter().find(|l| l.role == role)
    }
}
