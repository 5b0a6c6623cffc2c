//! Async WebSocket client for the candle push feed.
//!
//! This module is organized by concern:
//! - [`connection`] - The single shared connection and its state
//! - [`subscription`] - SUBSCRIBE/UNSUBSCRIBE commands
//! - [`handler`] - Incoming frame parsing

pub mod connection;
mod handler;
pub mod subscription;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use tungstenite::Message;

use crate::Result;

pub use connection::{ConnectionManager, ConnectionState};
pub use handler::parse_batch;
pub use subscription::SubscriptionController;

/// Write half of a feed WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a feed WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`SyncError`](crate::SyncError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!(url, "WebSocket handshake completed");

    Ok(ws_stream.split())
}
