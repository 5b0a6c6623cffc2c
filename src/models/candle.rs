//! OHLC candle models: the stored bar and the inbound live update record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::key::InstrumentKey;

/// A single OHLC bar keyed by the start of its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candle {
    /// Bucket start, seconds since the Unix epoch.
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Option<Decimal>,
}

/// One record of an inbound stream batch.
///
/// Field names follow the compact wire format pushed by the feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CandleUpdate {
    /// Instrument key string, `"<instrument>@<exchange>"`.
    #[serde(rename = "i")]
    pub instrument: String,
    /// Bucket start in epoch milliseconds.
    #[serde(rename = "t")]
    pub time_ms: i64,
    /// Timeframe in milliseconds.
    #[serde(rename = "f")]
    pub timeframe_ms: u64,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v", default)]
    pub volume: Option<Decimal>,
}

impl CandleUpdate {
    /// Returns `true` if this record belongs to the series identified by `key`.
    #[must_use]
    pub fn matches(&self, key: &InstrumentKey) -> bool {
        self.timeframe_ms == key.timeframe().as_millis() && self.instrument == key.symbol()
    }

    /// Bucket start in seconds.
    #[must_use]
    pub fn bucket(&self) -> i64 {
        self.time_ms.div_euclid(1_000)
    }

    /// Converts the record into a stored [`Candle`].
    #[must_use]
    pub fn candle(&self) -> Candle {
        Candle {
            time: self.bucket(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}
