//! Shared models for the candle feed.
//!
//! Contains the series identity, candle records, REST payloads and the
//! outbound stream protocol commands.

pub mod candle;
pub mod history;
pub mod instrument;
pub mod key;

use serde::Serialize;

pub use candle::{Candle, CandleUpdate};
pub use key::{InstrumentKey, Timeframe};

/// Outbound stream command types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandType {
    Subscribe,
    Unsubscribe,
}

impl CommandType {
    /// Returns the wire-format command name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Subscribe => "SUBSCRIBE",
            CommandType::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

/// A subscribe/unsubscribe request sent over the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolCommand {
    #[serde(rename = "type")]
    pub tpe: CommandType,
    pub instrument: String,
    /// Timeframe in milliseconds.
    pub timeframe: u64,
}

impl ProtocolCommand {
    #[must_use]
    pub fn subscribe(key: &InstrumentKey) -> Self {
        Self::new(CommandType::Subscribe, key)
    }

    #[must_use]
    pub fn unsubscribe(key: &InstrumentKey) -> Self {
        Self::new(CommandType::Unsubscribe, key)
    }

    fn new(tpe: CommandType, key: &InstrumentKey) -> Self {
        Self {
            tpe,
            instrument: key.symbol(),
            timeframe: key.timeframe().as_millis(),
        }
    }
}
