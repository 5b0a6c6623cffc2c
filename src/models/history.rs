//! `/api/history` response model.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use super::candle::Candle;

/// Status value marking a successful history response.
const STATUS_OK: &str = "ok";

/// Column-oriented history payload: parallel arrays, one entry per bar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(rename = "s")]
    pub status: String,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(rename = "t", default)]
    pub times: Vec<i64>,
    #[serde(rename = "o", default)]
    pub opens: Vec<Decimal>,
    #[serde(rename = "h", default)]
    pub highs: Vec<Decimal>,
    #[serde(rename = "l", default)]
    pub lows: Vec<Decimal>,
    #[serde(rename = "c", default)]
    pub closes: Vec<Decimal>,
    #[serde(rename = "v", default)]
    pub volumes: Vec<Decimal>,
}

impl HistoryResponse {
    /// Returns `true` if the server reported data for the requested range.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.status == STATUS_OK && !self.times.is_empty()
    }

    /// Converts the columns into bars sorted by time, one per bucket.
    ///
    /// An error status or an empty time column yields an empty list. Later
    /// rows win when the server repeats a bucket.
    #[must_use]
    pub fn into_candles(self) -> Vec<Candle> {
        if !self.has_data() {
            if self.status != STATUS_OK {
                warn!(status = %self.status, errmsg = ?self.errmsg, "History request returned no data");
            }
            return Vec::new();
        }

        let rows = [
            self.opens.len(),
            self.highs.len(),
            self.lows.len(),
            self.closes.len(),
        ]
        .into_iter()
        .fold(self.times.len(), usize::min);

        if rows != self.times.len() {
            warn!(
                times = self.times.len(),
                rows, "History columns have unequal lengths, truncating"
            );
        }

        let mut by_time = BTreeMap::new();
        for idx in 0..rows {
            let time = self.times[idx];
            by_time.insert(
                time,
                Candle {
                    time,
                    open: self.opens[idx],
                    high: self.highs[idx],
                    low: self.lows[idx],
                    close: self.closes[idx],
                    volume: self.volumes.get(idx).copied(),
                },
            );
        }

        by_time.into_values().collect()
    }
}
