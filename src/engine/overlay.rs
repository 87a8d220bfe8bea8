//! # engine::overlay
//!
//! **Overlay Compiler**: turns a raw bar series plus a signal descriptor into
//! a multi-layer [`ChartSpec`].
//!
//! ```text
//! bars ──┬─ bucket by timeframe ─ dedup (last wins) ─ sort ─┬─ candles
//!        │                                                  └─ volume bars (up/down colour)
//! signal ┼─ pivot_price > 0 ─────────────────────────────────── pivot / TP / SL lines
//!        └─ ml_win_prob ──────────────────────────────────────── probability badge
//! ```
//!
//! Pure and total: no I/O, no shared state, never panics on any input.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{
    BadgeTier, Candle, ChartSpec, LineRole, LineStyle, PriceBar, PriceLine, ProbabilityBadge,
    SignalDescriptor, TimeKey, Timeframe, VolumeBar,
};

// ─── Constants ────────────────────────────────────────────────────────────────

/// Take-profit sits 10% above the pivot.
pub const TAKE_PROFIT_FACTOR: f64 = 1.10;
/// Stop-loss sits 2% below the pivot.
pub const STOP_LOSS_FACTOR: f64 = 0.98;

/// Probability at or above which the badge reads "win".
pub const WIN_THRESHOLD: f64 = 50.0;
/// Probability at or above which (and below [`WIN_THRESHOLD`]) the badge reads "neutral".
pub const NEUTRAL_THRESHOLD: f64 = 35.0;

pub const VOLUME_UP_COLOR: &str = "rgba(38, 166, 154, 0.5)";
pub const VOLUME_DOWN_COLOR: &str = "rgba(239, 83, 80, 0.5)";

const PIVOT_COLOR: &str = "#2962ff";
const TAKE_PROFIT_COLOR: &str = "#26a69a";
const STOP_LOSS_COLOR: &str = "#ef5350";

// ─── Compile ──────────────────────────────────────────────────────────────────

/// Compiles `bars` and `signal` into a chart specification.
///
/// * Empty `bars`, or bars that are all non-finite → empty spec: no candles,
///   no lines, no badge.
/// * Bars with a non-finite price are omitted; the rest still compile.
/// * Daily timeframes key bars by calendar date, intraday by Unix seconds.
///   Bars sharing a key collapse to the later one in input order.
pub fn compile(bars: &[PriceBar], signal: &SignalDescriptor) -> ChartSpec {
    if bars.is_empty() {
        return ChartSpec::empty(signal.timeframe);
    }

    let mut buckets: BTreeMap<TimeKey, &PriceBar> = BTreeMap::new();
    let mut skipped = 0usize;

    for bar in bars {
        if !bar.is_finite() {
            skipped += 1;
            continue;
        }
        buckets.insert(time_key(bar, signal.timeframe), bar);
    }

    if skipped > 0 {
        debug!(skipped, "Non-finite bars omitted from chart");
    }
    if buckets.is_empty() {
        return ChartSpec::empty(signal.timeframe);
    }

    let candles = buckets
        .iter()
        .map(|(&time, bar)| Candle {
            time,
            open:  bar.open,
            high:  bar.high,
            low:   bar.low,
            close: bar.close,
        })
        .collect();

    let volume_bars = buckets
        .iter()
        .map(|(&time, bar)| VolumeBar {
            time,
            value: if bar.volume.is_finite() { bar.volume } else { 0.0 },
            color: volume_color(bar),
        })
        .collect();

    ChartSpec {
        timeframe: signal.timeframe,
        candles,
        volume_bars,
        price_lines: price_lines(signal.pivot_price),
        probability_badge: signal.ml_win_prob.and_then(probability_badge),
    }
}

// ─── Layers ───────────────────────────────────────────────────────────────────

/// Axis key for one bar under the given timeframe.
pub fn time_key(bar: &PriceBar, timeframe: Timeframe) -> TimeKey {
    if timeframe.is_daily() {
        TimeKey::Day(bar.timestamp.date_naive())
    } else {
        TimeKey::Instant(bar.timestamp.timestamp())
    }
}

/// Per-bar colour, independent of neighbouring bars.
#[inline]
pub fn volume_color(bar: &PriceBar) -> &'static str {
    if bar.is_up() {
        VOLUME_UP_COLOR
    } else {
        VOLUME_DOWN_COLOR
    }
}

/// Pivot, take-profit and stop-loss lines; empty when there is no pivot.
pub fn price_lines(pivot_price: f64) -> Vec<PriceLine> {
    if !(pivot_price.is_finite() && pivot_price > 0.0) {
        return Vec::new();
    }

    vec![
        PriceLine {
            price: pivot_price,
            role:  LineRole::Pivot,
            style: LineStyle::Solid,
            color: PIVOT_COLOR,
            title: "Pivot",
        },
        PriceLine {
            price: pivot_price * TAKE_PROFIT_FACTOR,
            role:  LineRole::TakeProfit,
            style: LineStyle::Dashed,
            color: TAKE_PROFIT_COLOR,
            title: "TP +10%",
        },
        PriceLine {
            price: pivot_price * STOP_LOSS_FACTOR,
            role:  LineRole::StopLoss,
            style: LineStyle::Dashed,
            color: STOP_LOSS_COLOR,
            title: "SL -2%",
        },
    ]
}

/// Tier for a win probability in percent.
pub fn badge_tier(probability: f64) -> BadgeTier {
    if probability >= WIN_THRESHOLD {
        BadgeTier::Win
    } else if probability >= NEUTRAL_THRESHOLD {
        BadgeTier::Neutral
    } else {
        BadgeTier::Loss
    }
}

/// `None` for a non-finite probability.
pub fn probability_badge(probability: f64) -> Option<ProbabilityBadge> {
    probability.is_finite().then(|| ProbabilityBadge {
        tier:  badge_tier(probability),
        value: probability,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
