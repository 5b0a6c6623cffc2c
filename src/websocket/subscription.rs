//! Series subscribe and unsubscribe commands.

use futures_util::SinkExt;
use tokio::sync::watch;
use tracing::{debug, info};
use tungstenite::Message;

use super::connection::{ConnectionManager, ConnectionState, SharedWriter};
use crate::Result;
use crate::models::{InstrumentKey, ProtocolCommand};

/// Sends protocol commands over the shared connection when it is ready.
///
/// Commands issued while the connection is not [`ConnectionState::Connected`]
/// are dropped; repeated commands for the same key are not deduplicated.
pub struct SubscriptionController {
    writer: SharedWriter,
    state: watch::Receiver<ConnectionState>,
}

impl SubscriptionController {
    #[must_use]
    pub fn new(connection: &ConnectionManager) -> Self {
        Self {
            writer: connection.writer(),
            state: connection.watch_state(),
        }
    }

    /// Sends `SUBSCRIBE` for `key`.
    ///
    /// Returns `Ok(false)` without sending if the connection is not ready.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`](crate::SyncError) if sending the message fails.
    pub async fn subscribe(&self, key: &InstrumentKey) -> Result<bool> {
        self.send(ProtocolCommand::subscribe(key)).await
    }

    /// Sends `UNSUBSCRIBE` for `key`.
    ///
    /// Returns `Ok(false)` without sending if the connection is not ready.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`](crate::SyncError) if sending the message fails.
    pub async fn unsubscribe(&self, key: &InstrumentKey) -> Result<bool> {
        self.send(ProtocolCommand::unsubscribe(key)).await
    }

    async fn send(&self, command: ProtocolCommand) -> Result<bool> {
        let state = *self.state.borrow();
        if state != ConnectionState::Connected {
            debug!(command = command.tpe.as_str(), ?state, "Not connected, command skipped");
            return Ok(false);
        }

        let mut guard = self.writer.lock().await;
        let Some(write) = guard.as_mut() else {
            debug!(command = command.tpe.as_str(), "No writer, command skipped");
            return Ok(false);
        };

        let json = serde_json::to_string(&command)?;
        debug!("Sending command: {}", json);
        write.send(Message::Text(json.into())).await?;
        info!(
            command = command.tpe.as_str(),
            instrument = %command.instrument,
            timeframe_ms = command.timeframe,
            "Command sent"
        );

        Ok(true)
    }
}
