//! WebSocket connection lifecycle management.
//!
//! [`ConnectionManager`] owns the single feed connection. It publishes
//! connection-state transitions on a `watch` channel and parsed update
//! batches on an internal queue, and never reconnects on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tungstenite::Message;

use super::{WsWriter, connect, parse_batch};
use crate::models::CandleUpdate;

/// Write half shared between the connection task and the subscription controller.
pub type SharedWriter = Arc<Mutex<Option<WsWriter>>>;

/// Lifecycle of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Updates tagged with the connection attempt that produced them.
struct Batch {
    epoch: u64,
    updates: Vec<CandleUpdate>,
}

/// State shared with the spawned connection task.
///
/// Every connect and disconnect bumps `epoch` while holding the state lock,
/// so a task from a superseded attempt can neither publish a state nor
/// install a writer.
struct Link {
    state: watch::Sender<ConnectionState>,
    epoch: AtomicU64,
    writer: SharedWriter,
    batches: mpsc::UnboundedSender<Batch>,
}

impl Link {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Publishes `next` only if `epoch` is still the live attempt.
    fn publish(&self, epoch: u64, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(epoch) || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }
}

/// Owns the single transport connection to the feed.
pub struct ConnectionManager {
    url: String,
    link: Arc<Link>,
    batches: mpsc::UnboundedReceiver<Batch>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        Self {
            url: url.into(),
            link: Arc::new(Link {
                state,
                epoch: AtomicU64::new(0),
                writer: Arc::new(Mutex::new(None)),
                batches: batch_tx,
            }),
            batches: batch_rx,
            task: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.link.state.borrow()
    }

    /// Subscribes to connection-state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.link.state.subscribe()
    }

    /// Handle to the write half, `None` while not connected.
    #[must_use]
    pub fn writer(&self) -> SharedWriter {
        Arc::clone(&self.link.writer)
    }

    /// Opens the transport unless one is already open or opening.
    ///
    /// Returns immediately after moving to [`ConnectionState::Connecting`];
    /// the handshake completes in a background task which then publishes
    /// [`ConnectionState::Connected`].
    pub fn connect(&mut self) {
        let mut epoch = 0;
        let started = self.link.state.send_if_modified(|state| {
            if *state != ConnectionState::Disconnected {
                return false;
            }
            epoch = self.link.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *state = ConnectionState::Connecting;
            true
        });

        if !started {
            debug!(state = ?self.state(), "Connect ignored, transport already active");
            return;
        }

        info!(url = %self.url, epoch, "Connecting to WebSocket");
        let link = Arc::clone(&self.link);
        let url = self.url.clone();
        if let Some(stale) = self.task.replace(tokio::spawn(run_connection(link, url, epoch))) {
            stale.abort();
        }
    }

    /// Closes the transport if open and returns to [`ConnectionState::Disconnected`].
    ///
    /// Any queued batches from the closed connection are discarded, and a
    /// later [`connect`](Self::connect) creates a fresh transport.
    pub async fn disconnect(&mut self) {
        let was_active = self.link.state.send_if_modified(|state| {
            self.link.epoch.fetch_add(1, Ordering::SeqCst);
            let changed = *state != ConnectionState::Disconnected;
            *state = ConnectionState::Disconnected;
            changed
        });

        if let Some(task) = self.task.take() {
            task.abort();
        }

        let writer = self.link.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.close().await
        {
            debug!("Close handshake failed: {e}");
        }

        while self.batches.try_recv().is_ok() {}

        if was_active {
            info!(url = %self.url, "WebSocket disconnected");
        }
    }

    /// Waits for the next batch of updates from the live connection.
    ///
    /// Never resolves while disconnected; batches left over from an earlier
    /// connection are skipped.
    pub async fn next_batch(&mut self) -> Option<Vec<CandleUpdate>> {
        loop {
            let batch = self.batches.recv().await?;
            if self.link.is_current(batch.epoch) {
                return Some(batch.updates);
            }
            debug!(epoch = batch.epoch, "Skipping batch from closed connection");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Drives one connection attempt: handshake, then read until the stream ends.
async fn run_connection(link: Arc<Link>, url: String, epoch: u64) {
    let (write, mut read) = match connect(&url).await {
        Ok(halves) => halves,
        Err(e) => {
            error!(%url, "Connection failed: {e}");
            link.publish(epoch, ConnectionState::Disconnected);
            return;
        }
    };

    {
        let mut guard = link.writer.lock().await;
        if !link.is_current(epoch) {
            debug!(epoch, "Connection superseded during handshake");
            return;
        }
        *guard = Some(write);
    }
    link.publish(epoch, ConnectionState::Connected);

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match parse_batch(&text) {
                Ok(updates) if updates.is_empty() => {}
                Ok(updates) => {
                    if link.batches.send(Batch { epoch, updates }).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Dropping stream message: {e}"),
            },
            Ok(Message::Close(frame)) => {
                info!(?frame, "WebSocket closed by server");
                break;
            }
            Ok(_) => {} // Binary/Ping/Pong/Frame
            Err(e) => {
                warn!("WebSocket error: {e}");
                break;
            }
        }
    }

    let mut guard = link.writer.lock().await;
    if link.is_current(epoch) {
        *guard = None;
        link.publish(epoch, ConnectionState::Disconnected);
        warn!(%url, "WebSocket stream ended");
    }
}
