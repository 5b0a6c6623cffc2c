//! Incoming WebSocket frame parsing.

use tracing::warn;

use crate::Result;
use crate::error::SyncError;
use crate::models::CandleUpdate;

/// Parses one text frame into its update records.
///
/// The frame must be a JSON array. Records inside it that fail to decode are
/// logged and skipped so one bad record does not cost the whole batch.
///
/// # Errors
///
/// Returns [`SyncError::MalformedMessage`] if the frame is not valid JSON or
/// not an array.
pub fn parse_batch(text: &str) -> Result<Vec<CandleUpdate>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| SyncError::MalformedMessage(e.to_string()))?;

    let records = match value {
        serde_json::Value::Array(records) => records,
        other => {
            return Err(SyncError::MalformedMessage(format!(
                "expected an array of updates, got {}",
                kind(&other)
            )));
        }
    };

    let total = records.len();
    let updates: Vec<CandleUpdate> = records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(update) => Some(update),
            Err(e) => {
                warn!("Dropping malformed update record: {e}");
                None
            }
        })
        .collect();

    if updates.len() != total {
        warn!(total, kept = updates.len(), "Partially malformed update batch");
    }

    Ok(updates)
}

fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
