//! Crate-level error types.
//!
//! [`SyncError`] unifies every failure source (configuration, REST
//! retrieval, WebSocket transport, protocol parsing) behind a single enum so
//! callers can match on the variant they care about while still using the
//! `?` operator for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// An environment variable held a value that could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// The instrument configuration endpoint could not be fetched or decoded.
    #[error("failed to load instrument configuration: {0}")]
    ConfigLoad(#[source] reqwest::Error),

    /// The history backfill request failed at the transport or decode level.
    #[error("history retrieval failed: {0}")]
    Retrieval(#[source] reqwest::Error),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inbound stream frame did not have the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An instrument key string was not of the form `<instrument>@<exchange>`.
    #[error("invalid instrument key: {0}")]
    InvalidKey(String),

    /// A timeframe label could not be parsed into a positive duration.
    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),
}
