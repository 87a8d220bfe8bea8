//! Domain models shared across the entire SignalDeck core.

pub mod bar;
pub mod chart;
pub mod signal;
pub mod version;
pub mod wire;

pub use bar::PriceBar;
pub use chart::{BadgeTier, Candle, ChartSpec, LineRole, LineStyle, PriceLine, ProbabilityBadge, TimeKey, VolumeBar};
pub use signal::{SignalDescriptor, SignalKey, SignalList, SignalRecord, Timeframe};
pub use version::{ResourceVersion, VersionToken};
pub use wire::PayloadError;
