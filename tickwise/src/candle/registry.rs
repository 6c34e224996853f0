use super::{Candle, CandleAggregator};
use crate::error::{SignalError, UpstreamError};
use async_trait::async_trait;
use chrono::TimeDelta;
use derive_more::Display;
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Aggregator shared between request handlers and streaming loops.
pub type SharedAggregator = Arc<Mutex<CandleAggregator>>;

/// Registry key: upper-cased symbol plus interval in seconds, e.g. `NIFTY_60`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Display)]
#[display("{symbol}_{interval_secs}")]
pub struct AggregatorKey {
    pub symbol: SmolStr,
    pub interval_secs: u64,
}

impl AggregatorKey {
    pub fn new(symbol: &str, interval_secs: u64) -> Self {
        Self {
            symbol: SmolStr::new(symbol.to_uppercase()),
            interval_secs,
        }
    }
}

/// Source of historical bars used to warm up a freshly created aggregator.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Most recent `limit` bars for `symbol` at (roughly) `interval_secs` resolution, oldest first.
    async fn history(
        &self,
        symbol: &str,
        interval_secs: u64,
        limit: usize,
    ) -> Result<Vec<Candle>, UpstreamError>;
}

/// Lazily populated map of [`CandleAggregator`]s keyed by `(symbol, interval)`.
///
/// The map lock is never held across the history fetch: concurrent first requests for the
/// same key may both fetch, but only the first insert wins and every caller receives the
/// same aggregator.
///
/// At most `max_aggregators` keys are kept. Inserting past the cap evicts the idlest
/// aggregator, the one whose latest candle is oldest. A handler still holding an evicted
/// aggregator keeps using it until its next lookup, which bootstraps a fresh one.
pub struct AggregatorRegistry {
    history: Arc<dyn HistoryProvider>,
    bootstrap_timeout: Duration,
    max_aggregators: usize,
    aggregators: RwLock<FnvHashMap<AggregatorKey, SharedAggregator>>,
}

impl std::fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("bootstrap_timeout", &self.bootstrap_timeout)
            .field("max_aggregators", &self.max_aggregators)
            .field("aggregators", &self.aggregators.read().len())
            .finish()
    }
}

impl AggregatorRegistry {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        bootstrap_timeout: Duration,
        max_aggregators: usize,
    ) -> Self {
        Self {
            history,
            bootstrap_timeout,
            max_aggregators: max_aggregators.max(1),
            aggregators: RwLock::new(FnvHashMap::default()),
        }
    }

    pub fn get(&self, symbol: &str, interval_secs: u64) -> Option<SharedAggregator> {
        self.aggregators
            .read()
            .get(&AggregatorKey::new(symbol, interval_secs))
            .cloned()
    }

    /// Fetch the aggregator for `(symbol, interval_secs)`, creating and bootstrapping it with
    /// up to `max_candles` historical bars on first use.
    ///
    /// A failed or timed out history fetch leaves the new aggregator empty. Fails only when
    /// `interval_secs` cannot be represented as a candle interval.
    pub async fn get_or_create(
        &self,
        symbol: &str,
        interval_secs: u64,
        max_candles: usize,
    ) -> Result<SharedAggregator, SignalError> {
        if let Some(existing) = self.get(symbol, interval_secs) {
            return Ok(existing);
        }
        let interval = i64::try_from(interval_secs.max(1))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| SignalError::invalid("interval", interval_secs as f64))?;
        let key = AggregatorKey::new(symbol, interval_secs);

        let bars = self.bootstrap(&key, max_candles).await;
        let aggregator = CandleAggregator::new(interval, max_candles).with_history(bars);

        let mut aggregators = self.aggregators.write();
        if !aggregators.contains_key(&key) && aggregators.len() >= self.max_aggregators {
            Self::evict_idlest(&mut aggregators);
        }
        let shared = aggregators.entry(key.clone()).or_insert_with(|| {
            info!(
                %key,
                candles = aggregator.sealed_len(),
                "created candle aggregator"
            );
            Arc::new(Mutex::new(aggregator))
        });
        Ok(Arc::clone(shared))
    }

    fn evict_idlest(aggregators: &mut FnvHashMap<AggregatorKey, SharedAggregator>) {
        let idlest = aggregators
            .iter()
            .min_by_key(|(_, aggregator)| aggregator.lock().last_start())
            .map(|(key, _)| key.clone());

        if let Some(key) = idlest {
            aggregators.remove(&key);
            info!(%key, "evicted idle candle aggregator");
        }
    }

    async fn bootstrap(&self, key: &AggregatorKey, max_candles: usize) -> Vec<Candle> {
        let fetch = self
            .history
            .history(&key.symbol, key.interval_secs, max_candles);

        match tokio::time::timeout(self.bootstrap_timeout, fetch).await {
            Ok(Ok(bars)) => {
                debug!(%key, bars = bars.len(), "fetched historical bars");
                bars
            }
            Ok(Err(error)) => {
                warn!(%key, %error, "history bootstrap failed, starting empty");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    %key,
                    timeout_secs = self.bootstrap_timeout.as_secs(),
                    "history bootstrap timed out, starting empty"
                );
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.aggregators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.read().is_empty()
    }
}
