//! Merged candle series for the active key.
//!
//! [`CandleStore`] folds the backfill and live updates into one
//! time-ordered series and forwards every committed change to the renderer
//! as a [`ChartEvent`].

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::models::{Candle, CandleUpdate, InstrumentKey};

/// Changes pushed to the chart renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartEvent {
    /// The series was emptied (new session or stop).
    Cleared,
    /// The backfill was committed; replaces everything on the chart.
    Snapshot(Vec<Candle>),
    /// One bucket was inserted or overwritten by a live update.
    Candle(Candle),
}

/// Time-ordered candle series holding at most one key's data.
#[derive(Debug, Default)]
pub struct CandleStore {
    candles: BTreeMap<i64, Candle>,
    sink: Option<mpsc::UnboundedSender<ChartEvent>>,
}

impl CandleStore {
    /// Creates a store that forwards its changes to `sink`.
    #[must_use]
    pub fn new(sink: mpsc::UnboundedSender<ChartEvent>) -> Self {
        Self {
            candles: BTreeMap::new(),
            sink: Some(sink),
        }
    }

    /// Creates a store with no renderer attached.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Empties the series.
    pub fn reset(&mut self) {
        self.candles.clear();
        self.emit(ChartEvent::Cleared);
    }

    /// Replaces the series with `candles`.
    pub fn apply_backfill(&mut self, candles: Vec<Candle>) {
        self.candles = candles.into_iter().map(|c| (c.time, c)).collect();
        debug!(candles = self.candles.len(), "Backfill committed");
        self.emit(ChartEvent::Snapshot(self.candles.values().cloned().collect()));
    }

    /// Upserts `update` if it belongs to `active`; discards it otherwise.
    ///
    /// An existing bucket is overwritten field by field with the update's
    /// values. Returns `true` if the update was accepted.
    pub fn apply_update(&mut self, update: &CandleUpdate, active: &InstrumentKey) -> bool {
        if !update.matches(active) {
            trace!(instrument = %update.instrument, timeframe_ms = update.timeframe_ms, "Discarding update for inactive key");
            return false;
        }

        let candle = update.candle();
        self.candles.insert(candle.time, candle.clone());
        self.emit(ChartEvent::Candle(candle));

        true
    }

    /// Detaches the renderer so no further events are sent.
    pub fn close(&mut self) {
        self.sink = None;
    }

    /// Iterates the series in ascending time order.
    pub fn candles(&self) -> impl Iterator<Item = &Candle> {
        self.candles.values()
    }

    #[must_use]
    pub fn get(&self, time: i64) -> Option<&Candle> {
        self.candles.get(&time)
    }

    #[must_use]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.values().next_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    fn emit(&mut self, event: ChartEvent) {
        if let Some(sink) = &self.sink
            && sink.send(event).is_err()
        {
            debug!("Chart receiver dropped, detaching");
            self.sink = None;
        }
    }
}
