//! REST collaborators: the bounded history backfill and the instrument
//! configuration fetch.
//!
//! [`HistorySource`] is the seam the [`Orchestrator`](crate::orchestrator::Orchestrator)
//! loads through; [`HistoryLoader`] is the HTTP implementation.

use std::future::Future;

use tracing::{debug, info};

use crate::models::history::HistoryResponse;
use crate::models::instrument::{ConfigResponse, InstrumentConfig};
use crate::models::{Candle, InstrumentKey, Timeframe};
use crate::{Result, SyncError};

const HISTORY_PATH: &str = "/api/history";
const CONFIG_PATH: &str = "/api/config";

/// Something that can produce the backfill for one series.
pub trait HistorySource {
    /// Loads candles for `key` with bucket times in `from..=to` (seconds).
    ///
    /// Returns bars sorted ascending, one per bucket. "No data" is an empty
    /// list, not an error.
    fn load(
        &self,
        key: &InstrumentKey,
        from: i64,
        to: i64,
    ) -> impl Future<Output = Result<Vec<Candle>>> + Send;
}

/// Computes the inclusive `(from, to)` backfill window ending at `now_secs`.
#[must_use]
pub fn backfill_range(timeframe: Timeframe, preload_bars: u32, now_secs: i64) -> (i64, i64) {
    let span = i64::try_from(timeframe.as_secs())
        .unwrap_or(i64::MAX)
        .saturating_mul(i64::from(preload_bars));
    (now_secs.saturating_sub(span), now_secs)
}

/// HTTP history client for `GET /api/history`.
#[derive(Debug, Clone)]
pub struct HistoryLoader {
    client: reqwest::Client,
    base_url: String,
}

impl HistoryLoader {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl HistorySource for HistoryLoader {
    /// # Errors
    ///
    /// Returns [`SyncError::Retrieval`] if the request fails, the server
    /// answers with an HTTP error status, or the body cannot be decoded.
    async fn load(&self, key: &InstrumentKey, from: i64, to: i64) -> Result<Vec<Candle>> {
        let url = format!("{}{HISTORY_PATH}", self.base_url);
        let symbol = key.symbol();
        let interval = key.timeframe().label();
        let (from_param, to_param) = (from.to_string(), to.to_string());
        debug!(%url, %symbol, %interval, from, to, "Requesting history");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.as_str()),
                ("interval", interval.as_str()),
                ("from", from_param.as_str()),
                ("to", to_param.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(SyncError::Retrieval)?;

        let body: HistoryResponse = response.json().await.map_err(SyncError::Retrieval)?;
        let candles = body.into_candles();
        info!(%key, candles = candles.len(), "History loaded");

        Ok(candles)
    }
}

/// Fetches the instruments offered by the server from `GET /api/config`.
///
/// # Errors
///
/// Returns [`SyncError::ConfigLoad`] if the request fails or the body
/// cannot be decoded.
pub async fn fetch_instruments(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<InstrumentConfig>> {
    let url = format!("{}{CONFIG_PATH}", base_url.trim_end_matches('/'));
    let config: ConfigResponse = client
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(SyncError::ConfigLoad)?
        .json()
        .await
        .map_err(SyncError::ConfigLoad)?;

    info!(instruments = config.instruments.len(), "Instrument configuration loaded");
    Ok(config.instruments)
}
