//! End-to-end evaluation of one symbol: tick folding, indicators, scoring, ML blending,
//! context lookup and conflict resolution.

use crate::{
    cache::ContextStore,
    candle::{AggregatorRegistry, Candle, HistoryProvider},
    composite::{
        CompositeInputs, CompositeScore, composite_score, fake_breakout, global_bias,
        volume_anomaly,
    },
    conflict::ConflictResolver,
    context::{
        ContextProvider, FlowData, GlobalCues, MarketMood, NewsSentiment, Regime, SectorView,
        Sourced, VixRisk, compute_market_mood, detect_regime, vix_risk_level,
    },
    error::{SignalError, UpstreamError},
    indicator::{IndicatorPipeline, IndicatorRow},
    ml::{DisabledPredictor, MlView, Predictor},
    reversal::{ReversalHint, detect_reversal},
    score::{MultiTimeframe, ScoreConfig, ScoreEngine, Signal, TrendDirection},
    validate::can_generate_reasoning,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, StrExt};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Largest candle interval accepted by [`SignalEngine::evaluate_at`], one trading day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on each aggregator's sealed history, also the number of bootstrap bars.
    pub max_candles: usize,
    /// Candles fed to the indicator pipeline per evaluation.
    pub candle_limit: usize,
    /// Bound on live `(symbol, interval)` aggregators, higher timeframes included.
    pub max_aggregators: usize,
    pub bootstrap_timeout: Duration,
    pub higher_timeframe_multiplier: u64,
    pub higher_timeframe_candles: usize,
    /// Bound on the ML prediction and sector lookups.
    pub upstream_timeout: Duration,
    pub sector_ttl: Duration,
    pub score: ScoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_candles: 250,
            candle_limit: 250,
            max_aggregators: 256,
            bootstrap_timeout: Duration::from_secs(5),
            higher_timeframe_multiplier: 3,
            higher_timeframe_candles: 40,
            upstream_timeout: Duration::from_secs(4),
            sector_ttl: Duration::from_secs(30),
            score: ScoreConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }
}

/// A price on its way into an aggregator.
#[derive(Debug, Copy, Clone)]
enum Tick {
    /// Checked against the aggregator's last close first.
    Raw(f64),
    /// Already accepted on the base interval.
    Accepted(f64),
}

/// Everything a client needs to render one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub symbol: SmolStr,
    pub interval_secs: u64,
    pub price: f64,
    pub generated_at: DateTime<Utc>,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorRow,
    /// EMA21 and a momentum indicator are warm, so the reasons are meaningful.
    pub indicators_available: bool,
    pub signal: Signal,
    /// Advisory hints only, they never change `signal.action`.
    pub reversal: Vec<ReversalHint>,
    pub composite: CompositeScore,
    pub ml: MlView,
    pub market_mood: MarketMood,
    pub regime: Regime,
    pub vix: Option<f64>,
    pub vix_risk: VixRisk,
    pub sector: Sourced<SectorView>,
    pub news: Sourced<NewsSentiment>,
    pub global_cues: Sourced<GlobalCues>,
    pub flows: Sourced<FlowData>,
}

pub struct SignalEngine {
    registry: AggregatorRegistry,
    predictor: Arc<dyn Predictor>,
    context: Arc<dyn ContextProvider>,
    store: Arc<ContextStore>,
    scorer: ScoreEngine,
    resolver: ConflictResolver,
    config: EngineConfig,
}

impl std::fmt::Debug for SignalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SignalEngine {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        context: Arc<dyn ContextProvider>,
        store: Arc<ContextStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry: AggregatorRegistry::new(
                history,
                config.bootstrap_timeout,
                config.max_aggregators,
            ),
            predictor: Arc::new(DisabledPredictor),
            context,
            store,
            scorer: ScoreEngine::new(config.score.clone()),
            resolver: ConflictResolver::default(),
            config,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn registry(&self) -> &AggregatorRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub async fn evaluate(
        &self,
        symbol: &str,
        interval_secs: u64,
        price: Option<f64>,
    ) -> Result<SignalReport, SignalError> {
        self.evaluate_at(symbol, interval_secs, price, Utc::now()).await
    }

    /// Evaluate `symbol` as of `now`, folding `price` into its candles first when given.
    ///
    /// Fails only on an invalid price, an interval above [`MAX_INTERVAL_SECS`] or when no
    /// candles exist yet; every other upstream problem degrades to a neutral,
    /// marked-unavailable input.
    pub async fn evaluate_at(
        &self,
        symbol: &str,
        interval_secs: u64,
        price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<SignalReport, SignalError> {
        let symbol = symbol.to_uppercase_smolstr();
        if interval_secs > MAX_INTERVAL_SECS {
            return Err(SignalError::invalid("interval", interval_secs as f64));
        }
        let interval_secs = interval_secs.max(1);

        let candles = self
            .fold_price(
                &symbol,
                interval_secs,
                self.config.max_candles,
                price.map(Tick::Raw),
                now,
            )
            .await?;
        let Some(last) = candles.last() else {
            return Err(SignalError::InsufficientData(format!(
                "no candles for {symbol} at {interval_secs}s"
            )));
        };
        let price = price.unwrap_or(last.close);

        let rows = IndicatorPipeline::compute(&candles);
        let latest = rows
            .last()
            .copied()
            .ok_or_else(|| SignalError::InsufficientData(format!("no indicator rows for {symbol}")))?
            .validated()?;
        let indicators_available = match can_generate_reasoning(&latest) {
            Ok(()) => true,
            Err(error) => {
                debug!(%symbol, %error, "signal reasons limited");
                false
            }
        };

        let mtf = MultiTimeframe {
            tf1: TrendDirection::from_row(&latest),
            tf_higher: self.higher_timeframe_trend(&symbol, interval_secs, price, now).await,
        };

        let ml = self.predict(&symbol, &candles).await;
        let mut signal = self.scorer.decide(&latest, Some(&ml));
        signal.mtf = mtf;

        let sector = self.sector(&symbol, &signal).await;
        let global_cues = self.store.global();
        let news = self.store.news();
        let flows = self.store.flows();
        let vix = self.store.vix();
        let market_mood = compute_market_mood(global_cues.get(), news.get(), vix, flows.get());

        let regime = detect_regime(&latest, ml.enabled.then_some(ml.trend_label.as_str()));

        let resolution = self
            .resolver
            .resolve(&signal, &ml, market_mood, &sector.value);
        signal.action = resolution.action;
        signal.reasons = resolution.reasons;

        let reversal = detect_reversal(&rows);
        let vix_risk = vix_risk_level(vix);
        let composite = composite_score(
            &CompositeInputs {
                action: signal.action,
                technical: signal.confidence,
                sector: sector.value.sector_score,
                sentiment: news.value.sentiment_raw,
                global: global_bias(global_cues.get()),
                flow: flows.value.score,
                volume: volume_anomaly(&candles),
                breakout: fake_breakout(&candles),
                ml_score: ml.active_score(),
            },
            &vix_risk,
        );

        debug!(
            %symbol,
            interval_secs,
            price,
            action = %signal.action,
            confidence = signal.confidence,
            composite = composite.score,
            %market_mood,
            "evaluated signal"
        );

        Ok(SignalReport {
            symbol,
            interval_secs,
            price,
            generated_at: now,
            candles,
            indicators: latest,
            indicators_available,
            signal,
            reversal,
            composite,
            ml,
            market_mood,
            regime,
            vix,
            vix_risk,
            sector,
            news,
            global_cues,
            flows,
        })
    }

    /// Fold `price` into the `(symbol, interval)` aggregator and return its latest candles.
    async fn fold_price(
        &self,
        symbol: &str,
        interval_secs: u64,
        max_candles: usize,
        tick: Option<Tick>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SignalError> {
        let aggregator = self
            .registry
            .get_or_create(symbol, interval_secs, max_candles)
            .await?;

        let mut aggregator = aggregator.lock();
        match tick {
            Some(Tick::Raw(price)) => {
                aggregator.fold(price, now)?;
            }
            Some(Tick::Accepted(price)) => {
                aggregator.update(price, now)?;
            }
            None => {}
        }
        Ok(aggregator.last_n(self.config.candle_limit, true))
    }

    async fn higher_timeframe_trend(
        &self,
        symbol: &str,
        interval_secs: u64,
        price: f64,
        now: DateTime<Utc>,
    ) -> TrendDirection {
        let Some(interval) = interval_secs.checked_mul(self.config.higher_timeframe_multiplier)
        else {
            warn!(%symbol, interval_secs, "higher timeframe interval overflows");
            return TrendDirection::Flat;
        };
        let candles = match self
            .fold_price(
                symbol,
                interval,
                self.config.higher_timeframe_candles,
                Some(Tick::Accepted(price)),
                now,
            )
            .await
        {
            Ok(candles) => candles,
            Err(error) => {
                warn!(%symbol, interval_secs = interval, %error, "higher timeframe unavailable");
                return TrendDirection::Flat;
            }
        };

        IndicatorPipeline::compute(&candles)
            .last()
            .map(TrendDirection::from_row)
            .unwrap_or_default()
    }

    async fn predict(&self, symbol: &str, candles: &[Candle]) -> MlView {
        let timeout = self.config.upstream_timeout;
        match tokio::time::timeout(timeout, self.predictor.predict(symbol, candles)).await {
            Ok(view) => view,
            Err(_) => {
                let error = UpstreamError::timeout("ml", timeout.as_secs());
                warn!(%symbol, %error, "ML prediction degraded");
                MlView::disabled(error.to_string())
            }
        }
    }

    async fn sector(&self, symbol: &str, signal: &Signal) -> Sourced<SectorView> {
        let action = signal.action.to_string();
        let key = format!("sector_{symbol}_{action}");
        let timeout = self.config.upstream_timeout;

        let result = self
            .store
            .sectors
            .get_or_compute(&key, self.config.sector_ttl, || async {
                tokio::time::timeout(timeout, self.context.sector(symbol, &action))
                    .await
                    .unwrap_or_else(|_| Err(UpstreamError::timeout("sector", timeout.as_secs())))
            })
            .await;

        if let Err(error) = &result {
            debug!(%symbol, %error, "sector view unavailable");
        }
        Sourced::from(result)
    }
}
