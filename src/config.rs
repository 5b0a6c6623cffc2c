//! Application configuration loaded from environment variables.
//!
//! - `CANDLESYNC_API_URL` - REST base URL serving `/api/config` and `/api/history`
//! - `CANDLESYNC_STREAM_URL` - push feed endpoint
//! - `CANDLESYNC_PRELOAD_BARS` - number of candles to backfill before going live
//! - `CANDLESYNC_RECONNECT` - whether a dropped feed is reconnected automatically
//!
//! Every variable is optional; empty values are treated as unset.

use crate::SyncError;

/// Default REST endpoint.
const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default push feed endpoint.
const DEFAULT_STREAM_URL: &str = "ws://localhost:8081/stream";

/// Default backfill size in bars.
pub const DEFAULT_PRELOAD_BARS: u32 = 100;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub stream_url: String,
    pub preload_bars: u32,
    pub reconnect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            preload_bars: DEFAULT_PRELOAD_BARS,
            reconnect: true,
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`SyncError::Config`] if `CANDLESYNC_PRELOAD_BARS` is not a
/// positive integer or `CANDLESYNC_RECONNECT` is not a recognised boolean.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let defaults = AppConfig::default();

    let api_url = non_empty_var("CANDLESYNC_API_URL").unwrap_or(defaults.api_url);
    let stream_url = non_empty_var("CANDLESYNC_STREAM_URL").unwrap_or(defaults.stream_url);

    let preload_bars = match non_empty_var("CANDLESYNC_PRELOAD_BARS") {
        Some(raw) => match raw.parse::<u32>() {
            Ok(bars) if bars > 0 => bars,
            _ => {
                return Err(SyncError::Config(format!(
                    "CANDLESYNC_PRELOAD_BARS must be a positive integer, got {raw:?}"
                )));
            }
        },
        None => defaults.preload_bars,
    };

    let reconnect = match non_empty_var("CANDLESYNC_RECONNECT") {
        Some(raw) => parse_flag(&raw).ok_or_else(|| {
            SyncError::Config(format!(
                "CANDLESYNC_RECONNECT must be true or false, got {raw:?}"
            ))
        })?,
        None => defaults.reconnect,
    };

    Ok(AppConfig {
        api_url,
        stream_url,
        preload_bars,
        reconnect,
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
