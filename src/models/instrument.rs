//! `/api/config` response model: instruments and their timeframes.

use serde::Deserialize;
use tracing::warn;

use super::key::{InstrumentKey, Timeframe};

/// Server configuration listing the instruments it streams.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// A single instrument offered by one source.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    /// Exchange the instrument is sourced from.
    pub source: String,
    pub timeframes: Vec<AdvertisedTimeframe>,
}

/// One advertised timeframe: a millisecond count (`60000`) or a label (`"1m"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AdvertisedTimeframe {
    Millis(u64),
    Label(String),
}

impl AdvertisedTimeframe {
    /// Resolves the advertised value into a [`Timeframe`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTimeframe`](crate::SyncError::InvalidTimeframe)
    /// if the value is not a positive whole number of seconds.
    pub fn timeframe(&self) -> crate::Result<Timeframe> {
        match self {
            AdvertisedTimeframe::Millis(millis) => Timeframe::from_millis(*millis),
            AdvertisedTimeframe::Label(label) => label.parse(),
        }
    }
}

impl InstrumentConfig {
    /// Expands this instrument into one key per usable timeframe.
    #[must_use]
    pub fn keys(&self) -> Vec<InstrumentKey> {
        self.timeframes
            .iter()
            .filter_map(|advertised| match advertised.timeframe() {
                Ok(timeframe) => Some(InstrumentKey::new(&self.name, &self.source, timeframe)),
                Err(e) => {
                    warn!(instrument = %self.name, source = %self.source, ?advertised, "Skipping timeframe: {e}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_config_and_expands_keys() {
        let config: ConfigResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "service": "PriceQueryService",
                "instruments": [
                    {"name": "BTCUSDT", "source": "BINANCE", "timeframes": ["5s", "1m", "bogus"]}
                ],
                "timestamp": 1700000000000
            }"#,
        )
        .unwrap();

        assert_eq!(config.service.as_deref(), Some("PriceQueryService"));
        let keys = config.instruments[0].keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].symbol(), "BTCUSDT@BINANCE");
        assert_eq!(keys[0].timeframe().as_millis(), 5_000);
        assert_eq!(keys[1].timeframe().as_millis(), 60_000);
    }

    #[test]
    fn millisecond_timeframes_from_server() {
        let config: ConfigResponse = serde_json::from_str(
            r#"{"status":"ok","instruments":[{"name":"BTCUSDT","source":"BINANCE","timeframes":[5000,60000,0]}]}"#,
        )
        .unwrap();

        assert_eq!(
            config.instruments[0].timeframes[..2],
            [AdvertisedTimeframe::Millis(5_000), AdvertisedTimeframe::Millis(60_000)]
        );
        let keys = config.instruments[0].keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].to_string(), "BTCUSDT@BINANCE 5s");
        assert_eq!(keys[1].to_string(), "BTCUSDT@BINANCE 1m");
    }

    #[test]
    fn optional_envelope_fields() {
        let config: ConfigResponse = serde_json::from_str(r#"{"instruments": []}"#).unwrap();
        assert!(config.instruments.is_empty());
        assert!(config.status.is_none());
    }
}
