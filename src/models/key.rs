//! Instrument + timeframe identity shared by the history API and the stream.

use std::fmt;
use std::str::FromStr;

use crate::SyncError;

const MILLIS_PER_SECOND: u64 = 1_000;

/// Label units understood by the history API, largest first.
const UNITS: [(char, u64); 4] = [
    ('d', 86_400_000),
    ('h', 3_600_000),
    ('m', 60_000),
    ('s', 1_000),
];

/// Candle bucket duration, carried in milliseconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe(u64);

impl Timeframe {
    /// Creates a timeframe from a millisecond count.
    ///
    /// The history API only names whole-second buckets.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTimeframe`] if `millis` is zero or not a
    /// whole number of seconds.
    pub fn from_millis(millis: u64) -> crate::Result<Self> {
        if millis == 0 || millis % MILLIS_PER_SECOND != 0 {
            return Err(SyncError::InvalidTimeframe(format!(
                "timeframe must be a positive whole number of seconds, got {millis} ms"
            )));
        }
        Ok(Self(millis))
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Seconds per bucket.
    #[must_use]
    pub fn as_secs(self) -> u64 {
        self.0 / MILLIS_PER_SECOND
    }

    /// Label used by the history API, e.g. `"1m"` for 60 000 ms.
    ///
    /// Uses the largest unit that divides the duration exactly.
    #[must_use]
    pub fn label(self) -> String {
        for (unit, size) in UNITS {
            if self.0 % size == 0 {
                return format!("{}{unit}", self.0 / size);
            }
        }
        format!("{}s", self.as_secs())
    }
}

impl FromStr for Timeframe {
    type Err = SyncError;

    /// Accepts `"<n>s"`, `"<n>m"`, `"<n>h"`, `"<n>d"` (unit in either case) or
    /// a bare millisecond count.
    fn from_str(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        let invalid = || SyncError::InvalidTimeframe(s.to_string());

        let Some(last) = s.chars().last() else {
            return Err(invalid());
        };

        if last.is_ascii_digit() {
            let millis = s.parse::<u64>().map_err(|_| invalid())?;
            return Self::from_millis(millis).map_err(|_| invalid());
        }

        let unit = last.to_ascii_lowercase();
        let size = UNITS
            .iter()
            .find(|(u, _)| *u == unit)
            .map(|(_, size)| *size)
            .ok_or_else(invalid)?;
        let count = s[..s.len() - last.len_utf8()]
            .parse::<u64>()
            .map_err(|_| invalid())?;
        let millis = count.checked_mul(size).ok_or_else(invalid)?;

        Self::from_millis(millis).map_err(|_| invalid())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Composite identity of one candle series: instrument, exchange, timeframe.
///
/// Two keys are the same series exactly when all three parts are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentKey {
    instrument: String,
    exchange: String,
    timeframe: Timeframe,
}

impl InstrumentKey {
    #[must_use]
    pub fn new(
        instrument: impl Into<String>,
        exchange: impl Into<String>,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            exchange: exchange.into(),
            timeframe,
        }
    }

    /// Builds a key from a wire symbol (`"<instrument>@<exchange>"`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidKey`] unless the symbol contains exactly
    /// one `@` with non-empty text on both sides.
    pub fn from_symbol(symbol: &str, timeframe: Timeframe) -> crate::Result<Self> {
        let mut parts = symbol.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(instrument), Some(exchange), None)
                if !instrument.is_empty() && !exchange.is_empty() =>
            {
                Ok(Self::new(instrument, exchange, timeframe))
            }
            _ => Err(SyncError::InvalidKey(symbol.to_string())),
        }
    }

    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    #[must_use]
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Wire key string consumed by both the history API and the stream.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}@{}", self.instrument, self.exchange)
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.instrument, self.exchange, self.timeframe)
    }
}
