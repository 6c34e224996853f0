use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tickwise::{
    Action, Candle, EngineConfig, SignalEngine,
    engine::MAX_INTERVAL_SECS,
    cache::{ContextRefresher, ContextStore, RefreshConfig},
    candle::HistoryProvider,
    context::{ContextProvider, FlowData, GlobalCues, MarketQuote, NewsSentiment, SectorView},
    error::{ErrorKind, UpstreamError},
    ml::{ProbabilityModel, SmoothedPredictor},
    score::TrendDirection,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 3, 45, 0).unwrap()
}

/// Zig-zag uptrend: +0.25 then -0.15, so RSI settles in the low 60s.
fn uptrend_history(len: usize, interval_secs: u64) -> Vec<Candle> {
    let mut close = 100.0;
    (0..len)
        .map(|i| {
            let open = close;
            close += if i % 2 == 0 { 0.25 } else { -0.15 };
            Candle {
                start_ts: start() + TimeDelta::seconds((i as u64 * interval_secs) as i64),
                open,
                high: open.max(close) + 0.1,
                low: open.min(close) - 0.1,
                close,
                volume: Some(1_000.0),
            }
        })
        .collect()
}

struct InMemoryHistory {
    bars: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl HistoryProvider for InMemoryHistory {
    async fn history(
        &self,
        _: &str,
        interval_secs: u64,
        limit: usize,
    ) -> Result<Vec<Candle>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bars = uptrend_history(self.bars, interval_secs);
        Ok(bars[bars.len().saturating_sub(limit)..].to_vec())
    }
}

struct BullishContext;

#[async_trait]
impl ContextProvider for BullishContext {
    async fn volatility_index(&self) -> Result<f64, UpstreamError> {
        Ok(13.0)
    }

    async fn global_cues(&self) -> Result<GlobalCues, UpstreamError> {
        let quote = MarketQuote {
            last: 100.0,
            change_pct: 1.0,
        };
        Ok(GlobalCues {
            nasdaq: Some(quote),
            nifty_spot: Some(quote),
        })
    }

    async fn news(&self) -> Result<NewsSentiment, UpstreamError> {
        Ok(NewsSentiment {
            headlines: vec!["Banks lead broad rally".to_owned()],
            sentiment_raw: 0.5,
            summary: "Positive".to_owned(),
        })
    }

    async fn flows(&self) -> Result<FlowData, UpstreamError> {
        Ok(FlowData {
            fii_net: 900.0,
            score: 0.9,
            label: "Strong buying".to_owned(),
        })
    }

    async fn sector(&self, _: &str, _: &str) -> Result<SectorView, UpstreamError> {
        Ok(SectorView {
            sector_score: 0.4,
            sector_comments: vec!["BANKS +1.2%".to_owned()],
            ..Default::default()
        })
    }
}

struct NoContext;

impl ContextProvider for NoContext {}

struct FixedModel(Value);

#[async_trait]
impl ProbabilityModel for FixedModel {
    async fn predict_next(&self, _: &str, _: &[Candle]) -> Result<Value, UpstreamError> {
        Ok(self.0.clone())
    }
}

async fn engine_with(
    context: Arc<dyn ContextProvider>,
    model: Option<Value>,
) -> (SignalEngine, Arc<InMemoryHistory>) {
    let history = Arc::new(InMemoryHistory {
        bars: 300,
        calls: AtomicUsize::new(0),
    });

    let store = Arc::new(ContextStore::default());
    ContextRefresher::new(Arc::clone(&context), Arc::clone(&store), RefreshConfig::default())
        .refresh_once()
        .await;

    let engine = SignalEngine::new(
        Arc::clone(&history) as Arc<dyn HistoryProvider>,
        context,
        store,
        EngineConfig::default(),
    );
    let engine = match model {
        Some(model) => engine.with_predictor(Arc::new(SmoothedPredictor::new(FixedModel(model)))),
        None => engine,
    };

    (engine, history)
}

fn next_tick_price() -> f64 {
    let history = uptrend_history(300, 60);
    history[history.len() - 1].close + 0.25
}

fn now() -> DateTime<Utc> {
    start() + TimeDelta::minutes(300)
}

#[tokio::test]
async fn test_full_confluence_escalates_to_strong_buy() {
    let (engine, history) = engine_with(
        Arc::new(BullishContext),
        Some(json!({"enabled": true, "p1": 0.75, "p3": 0.72, "p5": 0.7})),
    )
    .await;

    let report = engine
        .evaluate_at("nifty", 60, Some(next_tick_price()), now())
        .await
        .unwrap();

    assert_eq!(report.symbol, "NIFTY");
    assert_eq!(report.candles.len(), 250);
    assert!(report.indicators_available);
    assert!(report.indicators.ema200.is_some());
    assert!(report.signal.scores.trend >= 0.7);

    // Context: 50 + 2 + 3 + 5 + 8 + 5
    assert_eq!(report.market_mood.value(), 73.0);
    assert!(report.sector.is_available());
    assert!(report.ml.enabled);

    // Supportive context and an agreeing model keep the composite in buy territory
    assert!(report.composite.score >= 0.6);
    assert!(report.composite.components.sector > 0.5);
    assert!(report.composite.components.flow > 0.9);
    assert!(matches!(report.composite.label, "Strong Buy" | "Buy (moderate)"));

    assert_eq!(report.signal.action, Action::StrongBuy);
    assert!(report.signal.confidence > 0.55);
    assert_eq!(
        report.signal.reasons.last().map(String::as_str),
        Some("Perfect confluence, STRONG BUY.")
    );

    // Signal and higher timeframe aggregators bootstrapped once each
    assert_eq!(engine.registry().len(), 2);
    assert_eq!(history.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bearish_ml_vetoes_buy() {
    let (engine, _) = engine_with(
        Arc::new(BullishContext),
        Some(json!({"enabled": true, "p1": 0.3, "p3": 0.35, "p5": 0.4})),
    )
    .await;

    let report = engine
        .evaluate_at("NIFTY", 60, Some(next_tick_price()), now())
        .await
        .unwrap();

    assert_eq!(report.ml.trend_label, "Bearish");
    assert_eq!(report.signal.action, Action::Wait);
    assert!(
        report
            .signal
            .reasons
            .contains(&"ML contradicts BUY, switching to WAIT.".to_owned())
    );
}

#[tokio::test]
async fn test_missing_context_degrades_to_neutral() {
    let (engine, _) = engine_with(Arc::new(NoContext), None).await;

    let report = engine
        .evaluate_at("NIFTY", 60, Some(next_tick_price()), now())
        .await
        .unwrap();

    assert!(!report.ml.enabled);
    assert_eq!(report.ml.final_ml_score, 0.5);
    assert!(!report.sector.is_available());
    assert!(!report.news.is_available());
    assert_eq!(report.vix, None);
    assert_eq!(report.vix_risk.label, "Unknown");
    assert_eq!(report.market_mood.value(), 50.0);
    assert_eq!(report.signal.action, Action::Buy);
    assert!(report.signal.confidence.is_finite());

    // Unavailable context sits at neutral in the composite
    assert_eq!(report.composite.components.sector, 0.5);
    assert_eq!(report.composite.components.sentiment, 0.5);
    assert_eq!(report.composite.components.flow, 0.5);
    assert!(report.composite.label.contains("Buy"));
}

#[tokio::test]
async fn test_invalid_prices_are_rejected() {
    let (engine, _) = engine_with(Arc::new(NoContext), None).await;

    struct TestCase {
        price: f64,
        expected: ErrorKind,
    }

    let cases = vec![
        // TC0
        TestCase {
            price: f64::NAN,
            expected: ErrorKind::InvalidValue,
        },
        // TC1
        TestCase {
            price: -5.0,
            expected: ErrorKind::InvalidValue,
        },
        // TC2: more than 40% away from the last close
        TestCase {
            price: next_tick_price() * 1.5,
            expected: ErrorKind::InvalidValue,
        },
    ];

    for (index, test) in cases.into_iter().enumerate() {
        let actual = engine
            .evaluate_at("NIFTY", 60, Some(test.price), now())
            .await
            .map(|_| ())
            .map_err(|error| error.kind());
        assert_eq!(actual, Err(test.expected), "TC{} failed", index);
    }
}

#[tokio::test]
async fn test_no_history_and_no_price_is_insufficient_data() {
    struct EmptyHistory;

    #[async_trait]
    impl HistoryProvider for EmptyHistory {
        async fn history(&self, _: &str, _: u64, _: usize) -> Result<Vec<Candle>, UpstreamError> {
            Ok(Vec::new())
        }
    }

    let engine = SignalEngine::new(
        Arc::new(EmptyHistory),
        Arc::new(NoContext),
        Arc::new(ContextStore::default()),
        EngineConfig::default(),
    );

    let error = engine.evaluate_at("BANKNIFTY", 300, None, now()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InsufficientData);

    // A first tick is enough to report, with indicators still warming up
    let report = engine.evaluate_at("BANKNIFTY", 300, Some(48_000.0), now()).await.unwrap();
    assert_eq!(report.candles.len(), 1);
    assert!(!report.indicators_available);
    assert_eq!(report.indicators.rsi14, None);
    assert_eq!(report.signal.action, Action::Wait);
    assert!(report.reversal.is_empty());
    assert_eq!(report.composite.label, "No Trade / Wait");
}

#[tokio::test]
async fn test_interval_bounds() {
    let (engine, _) = engine_with(Arc::new(NoContext), None).await;

    struct TestCase {
        interval_secs: u64,
        expected: Result<(), ErrorKind>,
    }

    let cases = vec![
        // TC0: one trading day is the largest interval
        TestCase {
            interval_secs: MAX_INTERVAL_SECS,
            expected: Ok(()),
        },
        // TC1
        TestCase {
            interval_secs: MAX_INTERVAL_SECS + 1,
            expected: Err(ErrorKind::InvalidValue),
        },
        // TC2: beyond what a chrono interval can hold
        TestCase {
            interval_secs: 10_000_000_000_000_000,
            expected: Err(ErrorKind::InvalidValue),
        },
        // TC3
        TestCase {
            interval_secs: u64::MAX,
            expected: Err(ErrorKind::InvalidValue),
        },
    ];

    for (index, test) in cases.into_iter().enumerate() {
        let actual = engine
            .evaluate_at("NIFTY", test.interval_secs, Some(next_tick_price()), now())
            .await
            .map(|_| ())
            .map_err(|error| error.kind());
        assert_eq!(actual, test.expected, "TC{} failed", index);
    }

    // Rejected intervals never reach the registry
    assert_eq!(engine.registry().len(), 2);
}

#[tokio::test]
async fn test_stale_history_recovers_after_sustained_move() {
    let (engine, _) = engine_with(Arc::new(NoContext), None).await;
    let gap_up = next_tick_price() * 1.5;

    // Bootstrap history ends far below the market; the first ticks look like spikes
    for (index, minute) in [0, 1].into_iter().enumerate() {
        let error = engine
            .evaluate_at("NIFTY", 60, Some(gap_up), now() + TimeDelta::minutes(minute))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidValue, "TC{} failed", index);
    }

    let report = engine
        .evaluate_at("NIFTY", 60, Some(gap_up + 0.1), now() + TimeDelta::minutes(2))
        .await
        .unwrap();
    assert_eq!(report.price, gap_up + 0.1);
    assert_eq!(report.candles.last().map(|candle| candle.close), Some(gap_up + 0.1));

    // Subsequent ticks are judged against the new level
    let report = engine
        .evaluate_at("NIFTY", 60, Some(gap_up + 0.3), now() + TimeDelta::minutes(3))
        .await
        .unwrap();
    assert_eq!(report.price, gap_up + 0.3);
}

#[tokio::test]
async fn test_overflowing_higher_timeframe_reads_flat() {
    let history = Arc::new(InMemoryHistory {
        bars: 300,
        calls: AtomicUsize::new(0),
    });
    let engine = SignalEngine::new(
        history,
        Arc::new(NoContext),
        Arc::new(ContextStore::default()),
        EngineConfig {
            higher_timeframe_multiplier: u64::MAX,
            ..Default::default()
        },
    );

    let report = engine
        .evaluate_at("NIFTY", 60, Some(next_tick_price()), now())
        .await
        .unwrap();

    assert_eq!(report.signal.mtf.tf_higher, TrendDirection::Flat);
    assert_eq!(engine.registry().len(), 1);
}
