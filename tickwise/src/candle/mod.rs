//! Tick-to-candle aggregation.
//!
//! Folds price observations into OHLC candles and keeps a bounded history per
//! `(symbol, interval)`. Bucket boundaries are anchored to the arrival time of the first
//! tick of each bucket, not to a calendar grid: a bucket opened at 09:15:07 with a 60s
//! interval seals on the first tick at or after 09:16:07. Under irregular tick arrival the
//! boundaries drift, which is accepted in exchange for never emitting empty candles.

use crate::{error::SignalError, validate::PriceGuard};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

pub mod registry;

pub use registry::{AggregatorKey, AggregatorRegistry, HistoryProvider, SharedAggregator};

/// A single OHLC candle.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Candle {
    /// Arrival time of the first tick in this bucket (unix seconds on the wire).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Candle {
    /// Open a new candle where `open = high = low = close = price`.
    pub fn open_at(start_ts: DateTime<Utc>, price: f64) -> Self {
        Self {
            start_ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: None,
        }
    }

    /// Finite prices and `high >= max(open, close)`, `low <= min(open, close)`.
    pub fn is_valid(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|value| value.is_finite() && *value > 0.0);

        finite && self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    fn absorb(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Stateful OHLC bucketer for one `(symbol, interval)` key.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    interval: TimeDelta,
    max_candles: usize,
    current: Option<Candle>,
    history: VecDeque<Candle>,
    guard: PriceGuard,
}

impl CandleAggregator {
    pub fn new(interval: TimeDelta, max_candles: usize) -> Self {
        Self {
            interval,
            max_candles: max_candles.max(1),
            current: None,
            history: VecDeque::with_capacity(max_candles.max(1)),
            guard: PriceGuard::default(),
        }
    }

    /// Seed the sealed history with historical bars, keeping the most recent `max_candles`.
    ///
    /// Bars violating the OHLC invariant are dropped.
    pub fn with_history(mut self, bars: impl IntoIterator<Item = Candle>) -> Self {
        for bar in bars {
            if bar.is_valid() {
                self.seal(bar);
            } else {
                debug!(start_ts = %bar.start_ts, "dropping invalid historical bar");
            }
        }
        self
    }

    /// Fold a price observation into the live bucket.
    ///
    /// Returns the sealed candle when `now` falls outside the live bucket.
    pub fn update(&mut self, price: f64, now: DateTime<Utc>) -> Result<Option<Candle>, SignalError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(SignalError::invalid("price", price));
        }

        match self.current.as_mut() {
            None => {
                self.current = Some(Candle::open_at(now, price));
                Ok(None)
            }
            Some(live) if now - live.start_ts < self.interval => {
                live.absorb(price);
                Ok(None)
            }
            Some(live) => {
                let sealed = *live;
                *live = Candle::open_at(now, price);
                self.seal(sealed);
                Ok(Some(sealed))
            }
        }
    }

    /// Check `price` against the last close, then fold it in.
    ///
    /// Moves beyond the allowed range are rejected until the market proves the new level,
    /// see [`PriceGuard`].
    pub fn fold(&mut self, price: f64, now: DateTime<Utc>) -> Result<Option<Candle>, SignalError> {
        let price = self.guard.check(price, self.last_close())?;
        self.update(price, now)
    }

    fn seal(&mut self, candle: Candle) {
        while self.history.len() >= self.max_candles {
            self.history.pop_front();
        }
        self.history.push_back(candle);
    }

    /// Sealed history oldest first, optionally followed by the live candle.
    pub fn candles(&self, include_current: bool) -> Vec<Candle> {
        let mut candles: Vec<Candle> = self.history.iter().copied().collect();
        if include_current {
            candles.extend(self.current);
        }
        candles
    }

    /// Last `n` candles (sealed plus live when requested).
    pub fn last_n(&self, n: usize, include_current: bool) -> Vec<Candle> {
        let mut candles = self.candles(include_current);
        let start = candles.len().saturating_sub(n);
        candles.drain(..start);
        candles
    }

    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// Most recent close, live candle first.
    pub fn last_close(&self) -> Option<f64> {
        self.current
            .as_ref()
            .or_else(|| self.history.back())
            .map(|candle| candle.close)
    }

    /// Start of the most recent candle, live candle first. Used to rank aggregators by
    /// activity.
    pub fn last_start(&self) -> Option<DateTime<Utc>> {
        self.current
            .as_ref()
            .or_else(|| self.history.back())
            .map(|candle| candle.start_ts)
    }

    pub fn sealed_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.current.is_none()
    }
}
