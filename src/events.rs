//! # events
//!
//! [`DeckEvent`]: everything the core pushes to dashboard clients over
//! `/ws/monitor`.
//!
//! Events travel through a `tokio::sync::broadcast::Sender<String>` already
//! serialized, so the channel never needs `DeckEvent: Clone` per receiver.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceUpdate {
    pub ticker:        String,
    pub signal_date:   NaiveDate,
    pub current_price: f64,
    pub return_pct:    f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeckEvent {
    /// A full refresh replaced the view's working set.
    SignalsReplaced {
        view:         String,
        count:        usize,
        skipped:      usize,
        generated_at: Option<DateTime<Utc>>,
    },

    /// A price tick was reconciled into the working set.
    PricesReconciled {
        view:    String,
        updates: Vec<PriceUpdate>,
    },

    /// A fetch failed; the view keeps showing its last-known-good data.
    RefreshFailed {
        view:   String,
        source: String,
        error:  String,
    },

    ResourcesChanged {
        view: String,
        keys: Vec<String>,
    },

    ViewStopped {
        view: String,
    },
}

impl DeckEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_event_tag_is_screaming_snake() {
        let json = DeckEvent::ResourcesChanged {
            view: "vcp".into(),
            keys: vec!["vcp".into()],
        }
        .to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "RESOURCES_CHANGED");
        assert_eq!(value["keys"][0], "vcp");
    }
}
