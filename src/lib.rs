//! Real-time candle stream synchronization.
//!
//! Preloads recent history for one instrument + timeframe over REST, then
//! keeps the series current from a WebSocket push feed. The
//! [`Orchestrator`](orchestrator::Orchestrator) sequences the steps and
//! guarantees at most one active subscription.

pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod websocket;

pub use error::{Result, SyncError};
