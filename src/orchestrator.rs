//! Start/stop state machine sequencing backfill, connection and subscription.
//!
//! The [`Orchestrator`] owns every component and is driven from a single
//! task: [`start`](Orchestrator::start) and [`stop`](Orchestrator::stop)
//! change the session, and [`step`](Orchestrator::step) waits for and handles
//! one asynchronous event (connection ready, update batch, connection change,
//! reconnect timer). Because all of these take `&mut self`, the active-key
//! check and the store write can never interleave with a key change.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::Result;
use crate::config::{AppConfig, DEFAULT_PRELOAD_BARS};
use crate::history::{HistoryLoader, HistorySource, backfill_range};
use crate::models::{CandleUpdate, InstrumentKey};
use crate::store::{CandleStore, ChartEvent};
use crate::websocket::{ConnectionManager, ConnectionState, SubscriptionController};

/// Initial backoff duration between reconnection attempts.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff duration between reconnection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No active key.
    Idle,
    /// Backfill in flight.
    Loading,
    /// Connection issued; live updates are folded into the store.
    Running,
}

/// One-shot registration to subscribe `key` once the connection is ready.
///
/// Dropping the token cancels the pending subscribe.
struct SubscribeToken {
    key: InstrumentKey,
    state: watch::Receiver<ConnectionState>,
}

impl SubscribeToken {
    async fn ready(&mut self) -> bool {
        self.state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .is_ok()
    }
}

/// Asynchronous inputs handled by [`Orchestrator::step`].
enum Event {
    Ready(bool),
    Batch(Vec<CandleUpdate>),
    ConnectionChanged,
    Retry,
}

/// Sequences history, connection and subscription for one active key.
pub struct Orchestrator<H> {
    history: H,
    connection: ConnectionManager,
    subscriptions: SubscriptionController,
    store: CandleStore,
    connection_events: watch::Receiver<ConnectionState>,
    preload_bars: u32,
    reconnect: bool,
    state: SessionState,
    active: Option<InstrumentKey>,
    subscribed: bool,
    pending: Option<SubscribeToken>,
    retry_at: Option<Instant>,
    backoff: Duration,
}

impl Orchestrator<HistoryLoader> {
    /// Builds the HTTP-backed orchestrator described by `config`.
    #[must_use]
    pub fn from_config(config: &AppConfig, sink: mpsc::UnboundedSender<ChartEvent>) -> Self {
        Self::new(
            HistoryLoader::new(&config.api_url),
            ConnectionManager::new(&config.stream_url),
            CandleStore::new(sink),
        )
        .with_preload_bars(config.preload_bars)
        .with_reconnect(config.reconnect)
    }
}

impl<H: HistorySource> Orchestrator<H> {
    /// Creates an idle orchestrator over the given components.
    ///
    /// Preloads [`DEFAULT_PRELOAD_BARS`] bars and reconnects by default.
    #[must_use]
    pub fn new(history: H, connection: ConnectionManager, store: CandleStore) -> Self {
        let subscriptions = SubscriptionController::new(&connection);
        let connection_events = connection.watch_state();

        Self {
            history,
            connection,
            subscriptions,
            store,
            connection_events,
            preload_bars: DEFAULT_PRELOAD_BARS,
            reconnect: true,
            state: SessionState::Idle,
            active: None,
            subscribed: false,
            pending: None,
            retry_at: None,
            backoff: INITIAL_BACKOFF,
        }
    }

    /// Sets how many bars are backfilled before going live.
    #[must_use]
    pub fn with_preload_bars(mut self, preload_bars: u32) -> Self {
        self.preload_bars = preload_bars;
        self
    }

    /// Enables or disables reconnecting after the feed drops while running.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Key of the current session, if any.
    #[must_use]
    pub fn active_key(&self) -> Option<&InstrumentKey> {
        self.active.as_ref()
    }

    /// Returns `true` once `SUBSCRIBE` went out on the current connection.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// State of the underlying feed connection.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The merged series for the active key.
    #[must_use]
    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    /// Starts a session for `key`, replacing any current one.
    ///
    /// Clears the store, loads the backfill, commits it, then issues the
    /// connection and arms a one-shot subscribe for when it becomes ready.
    /// The session is [`SessionState::Running`] as soon as the connection is
    /// issued; the subscribe itself happens in a later [`step`](Self::step).
    ///
    /// # Errors
    ///
    /// Returns the backfill error, after reverting to [`SessionState::Idle`].
    pub async fn start(&mut self, key: InstrumentKey) -> Result<()> {
        if self.state != SessionState::Idle {
            self.stop().await;
        }

        self.state = SessionState::Loading;
        self.active = Some(key.clone());
        self.store.reset();

        let (from, to) = backfill_range(key.timeframe(), self.preload_bars, now_secs());
        info!(%key, from, to, "Loading history");

        let candles = match self.history.load(&key, from, to).await {
            Ok(candles) => candles,
            Err(e) => {
                error!(%key, "Failed to start: {e}");
                self.active = None;
                self.state = SessionState::Idle;
                return Err(e);
            }
        };

        self.store.apply_backfill(candles);
        self.connection.connect();
        self.arm_subscribe(key.clone());
        self.state = SessionState::Running;
        info!(%key, candles = self.store.len(), "Session running");

        Ok(())
    }

    /// Stops the current session. A no-op apart from disconnecting when idle.
    ///
    /// Cancels any pending subscribe or reconnect, unsubscribes the active key
    /// if running, disconnects and clears the store.
    pub async fn stop(&mut self) {
        self.pending = None;
        self.retry_at = None;

        if self.state == SessionState::Running
            && let Some(key) = &self.active
        {
            match self.subscriptions.unsubscribe(key).await {
                Ok(true) => {}
                Ok(false) => debug!(%key, "Not connected, unsubscribe skipped"),
                Err(e) => warn!(%key, "Failed to unsubscribe: {e}"),
            }
        }

        self.connection.disconnect().await;
        // Transitions caused by our own disconnect are not connection losses.
        self.connection_events.mark_unchanged();

        if let Some(key) = self.active.take() {
            info!(%key, from = ?self.state, "Session stopped");
            self.store.reset();
        }
        self.subscribed = false;
        self.backoff = INITIAL_BACKOFF;
        self.state = SessionState::Idle;
    }

    /// Stops the session and detaches the chart renderer.
    pub async fn shutdown(&mut self) {
        self.stop().await;
        self.store.close();
    }

    /// Waits for the next asynchronous event and handles it.
    ///
    /// Never resolves while idle.
    pub async fn step(&mut self) {
        let event = tokio::select! {
            biased;
            ready = wait_ready(&mut self.pending) => Event::Ready(ready),
            Ok(()) = self.connection_events.changed() => Event::ConnectionChanged,
            Some(updates) = self.connection.next_batch() => Event::Batch(updates),
            () = wait_until(self.retry_at) => Event::Retry,
        };

        match event {
            Event::Ready(true) => self.on_ready().await,
            Event::Ready(false) => {
                debug!("Connection state channel closed, dropping pending subscribe");
                self.pending = None;
            }
            Event::ConnectionChanged => self.on_connection_changed().await,
            Event::Batch(updates) => self.on_batch(&updates),
            Event::Retry => self.on_retry(),
        }
    }

    fn arm_subscribe(&mut self, key: InstrumentKey) {
        self.pending = Some(SubscribeToken {
            key,
            state: self.connection.watch_state(),
        });
    }

    async fn on_ready(&mut self) {
        let Some(token) = self.pending.take() else {
            return;
        };

        if self.state != SessionState::Running || self.active.as_ref() != Some(&token.key) {
            debug!(key = %token.key, "Ignoring stale subscribe");
            return;
        }

        match self.subscriptions.subscribe(&token.key).await {
            Ok(true) => {
                self.subscribed = true;
                self.backoff = INITIAL_BACKOFF;
            }
            Ok(false) => {
                debug!(key = %token.key, "Connection went away before subscribe");
            }
            Err(e) => {
                warn!(key = %token.key, "Failed to subscribe: {e}");
                self.on_connection_lost().await;
            }
        }
    }

    async fn on_connection_changed(&mut self) {
        let state = *self.connection_events.borrow_and_update();
        trace!(?state, "Connection state changed");

        if state == ConnectionState::Disconnected
            && self.state == SessionState::Running
            && self.retry_at.is_none()
        {
            warn!(key = ?self.active, "Stream connection lost");
            self.on_connection_lost().await;
        }
    }

    /// Running never outlives the connection: either schedule a reconnect or stop.
    async fn on_connection_lost(&mut self) {
        self.subscribed = false;
        self.pending = None;

        if !self.reconnect {
            self.stop().await;
            return;
        }

        self.connection.disconnect().await;
        info!(backoff_secs = self.backoff.as_secs(), "Backing off before reconnect");
        self.retry_at = Some(Instant::now() + self.backoff);
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
    }

    fn on_retry(&mut self) {
        self.retry_at = None;
        if self.state != SessionState::Running {
            return;
        }
        let Some(key) = self.active.clone() else {
            return;
        };

        info!(%key, "Reconnecting");
        self.connection.connect();
        self.arm_subscribe(key);
    }

    fn on_batch(&mut self, updates: &[CandleUpdate]) {
        let Some(key) = &self.active else {
            return;
        };
        if self.state != SessionState::Running {
            return;
        }

        let mut accepted = 0;
        for update in updates {
            if self.store.apply_update(update, key) {
                accepted += 1;
            }
        }
        trace!(received = updates.len(), accepted, "Applied update batch");
    }
}

async fn wait_ready(pending: &mut Option<SubscribeToken>) -> bool {
    match pending {
        Some(token) => token.ready().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
