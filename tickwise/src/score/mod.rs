//! Multi-factor heuristic scoring of the latest indicator row.
//!
//! Trend, momentum and candle structure are scored in `[-1, 1]` and combined into a
//! directional score; volatility quality in `[0, 1]` feeds the confidence. Indicators that
//! are still warming up are skipped rather than read as zero.

use crate::{indicator::IndicatorRow, ml::MlView};
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod config;
pub mod trend;

pub use config::ScoreConfig;
pub use trend::{MultiTimeframe, TrendDirection};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Display, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[display("BUY")]
    Buy,
    #[display("SELL")]
    Sell,
    #[default]
    #[display("WAIT")]
    Wait,
    #[display("STRONG_BUY")]
    StrongBuy,
    #[display("STRONG_SELL")]
    StrongSell,
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ScoreVector {
    pub trend: f64,
    pub momentum: f64,
    pub volatility_quality: f64,
    pub candle_quality: f64,
}

/// Trading recommendation for one evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Signal {
    pub action: Action,
    pub confidence: f64,
    pub bullish_score: f64,
    pub bearish_score: f64,
    pub reasons: Vec<String>,
    pub scores: ScoreVector,
    #[serde(default)]
    pub mtf: MultiTimeframe,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    config: ScoreConfig,
}

impl ScoreEngine {
    pub fn new(config: ScoreConfig) -> Self {
        Self { config }
    }

    /// Turn the latest indicator row, and optionally an ML view, into a [`Signal`].
    pub fn decide(&self, row: &IndicatorRow, ml: Option<&MlView>) -> Signal {
        let config = &self.config;
        let close = row.close();
        let mut reasons = Vec::new();

        let scores = ScoreVector {
            trend: trend_score(row, &mut reasons),
            momentum: momentum_score(row, &mut reasons),
            volatility_quality: volatility_quality(row, &mut reasons),
            candle_quality: candle_quality(row, &mut reasons),
        };

        let directional = config.trend_weight * scores.trend
            + config.momentum_weight * scores.momentum
            + config.candle_weight * scores.candle_quality;
        let mut bullish = directional.max(0.0);
        let mut bearish = (-directional).max(0.0);

        if let Some(ml_score) = ml.and_then(MlView::active_score) {
            if ml_score > config.ml_bullish_above {
                bullish += config.ml_boost;
                reasons.push("ML confirms upward continuation.".to_owned());
            } else if ml_score < config.ml_bearish_below {
                bearish += config.ml_boost;
                reasons.push("ML confirms downward continuation.".to_owned());
            }
        }
        bullish = bullish.min(1.0);
        bearish = bearish.min(1.0);

        let mut confidence = (config.direction_confidence_weight * directional.abs()
            + (1.0 - config.direction_confidence_weight) * scores.volatility_quality)
            .clamp(0.0, 1.0);

        if row
            .atr14
            .is_some_and(|atr| atr > close * config.high_atr_fraction)
        {
            reasons.push("High volatility regime, risky zone.".to_owned());
            confidence = (confidence - config.high_atr_penalty).max(0.0);
        }

        if let Some(ema9) = row.ema9 {
            if bullish > 0.5 && close < ema9 {
                reasons.push("Pullback entry zone within uptrend (good risk/reward).".to_owned());
            }
            if bearish > 0.5 && close > ema9 {
                reasons.push("Possible pullback against bearish trend; delay entry.".to_owned());
            }
        }

        let chop = row
            .ema9
            .zip(row.ema21)
            .is_some_and(|(ema9, ema21)| (ema9 - ema21).abs() < close * config.chop_spread_fraction);

        let (action, confidence) = if chop {
            reasons.push("Sideways / low-trend zone.".to_owned());
            (Action::Wait, confidence.min(config.chop_confidence))
        } else {
            let mut action = if bullish > config.action_score_min
                && confidence > config.action_confidence_min
            {
                Action::Buy
            } else if bearish > config.action_score_min
                && confidence > config.action_confidence_min
            {
                Action::Sell
            } else {
                Action::Wait
            };

            if scores.volatility_quality < config.min_volatility_quality
                && confidence < config.volatility_override_confidence
            {
                action = Action::Wait;
                reasons.push("Volatility conditions are not ideal; forcing WAIT.".to_owned());
            }

            if directional.abs() < config.min_directional {
                action = Action::Wait;
                reasons.push("Directional strength weak; no clear edge.".to_owned());
            }

            match action {
                Action::Wait => (action, confidence.min(config.wait_confidence_cap)),
                _ => (action, confidence),
            }
        };

        debug!(
            %action,
            confidence,
            directional,
            trend = scores.trend,
            momentum = scores.momentum,
            "scored indicator row"
        );

        Signal {
            action,
            confidence: finite_or_zero(confidence),
            bullish_score: finite_or_zero(bullish),
            bearish_score: finite_or_zero(bearish),
            reasons,
            scores,
            mtf: MultiTimeframe::default(),
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn trend_score(row: &IndicatorRow, reasons: &mut Vec<String>) -> f64 {
    let close = row.close();
    let mut score = 0.0;

    let stack = [row.ema9, row.ema21, row.ema50, row.ema200];
    let full_stack = stack.iter().all(Option::is_some);
    let stack: Vec<f64> = std::iter::once(close).chain(stack.into_iter().flatten()).collect();

    if full_stack && stack.iter().tuple_windows().all(|(a, b)| a > b) {
        score += 0.7;
        reasons.push("Strong EMA uptrend (close > EMA9 > EMA21 > EMA50 > EMA200).".to_owned());
    } else if full_stack && stack.iter().tuple_windows().all(|(a, b)| a < b) {
        score -= 0.7;
        reasons.push("Strong EMA downtrend (close < EMA9 < EMA21 < EMA50 < EMA200).".to_owned());
    } else if let Some((ema21, ema50)) = row.ema21.zip(row.ema50) {
        if close > ema21 && ema21 > ema50 {
            score += 0.3;
            reasons.push("Price above EMA21 and EMA21 > EMA50 (moderate uptrend).".to_owned());
        } else if close < ema21 && ema21 < ema50 {
            score -= 0.3;
            reasons.push("Price below EMA21 and EMA21 < EMA50 (moderate downtrend).".to_owned());
        }
    }

    match row.supertrend {
        Some(supertrend) if close > supertrend => {
            score += 0.2;
            reasons.push("Price above Supertrend (trend bullish).".to_owned());
        }
        Some(supertrend) if close < supertrend => {
            score -= 0.2;
            reasons.push("Price below Supertrend (trend bearish).".to_owned());
        }
        _ => {}
    }

    f64::clamp(score, -1.0, 1.0)
}

fn momentum_score(row: &IndicatorRow, reasons: &mut Vec<String>) -> f64 {
    let mut score = 0.0;

    match row.rsi14 {
        Some(rsi) if rsi > 70.0 => {
            score += 0.2;
            reasons.push(format!(
                "RSI {rsi:.1} (strong bullish momentum, but near overbought)."
            ));
        }
        Some(rsi) if rsi > 55.0 => {
            score += 0.4;
            reasons.push(format!("RSI {rsi:.1} (healthy bullish momentum)."));
        }
        Some(rsi) if rsi < 30.0 => {
            score -= 0.2;
            reasons.push(format!(
                "RSI {rsi:.1} (strong bearish momentum, but near oversold)."
            ));
        }
        Some(rsi) if rsi < 45.0 => {
            score -= 0.4;
            reasons.push(format!("RSI {rsi:.1} (healthy bearish momentum)."));
        }
        Some(rsi) => reasons.push(format!("RSI {rsi:.1} (neutral).")),
        None => reasons.push("RSI data unavailable (insufficient candles).".to_owned()),
    }

    if let (Some(macd), Some(signal), Some(hist)) = (row.macd, row.macd_signal, row.macd_hist) {
        if macd > signal && hist > 0.0 {
            score += 0.3;
            reasons.push("MACD above Signal with positive histogram (bullish momentum).".to_owned());
        } else if macd < signal && hist < 0.0 {
            score -= 0.3;
            reasons.push("MACD below Signal with negative histogram (bearish momentum).".to_owned());
        }
    }

    f64::clamp(score, -1.0, 1.0)
}

fn volatility_quality(row: &IndicatorRow, reasons: &mut Vec<String>) -> f64 {
    let mut score = 0.5;

    match row.atr_pct() {
        Some(atr_pct) if atr_pct < 0.2 => {
            score -= 0.3;
            reasons.push("ATR too low (very low volatility, moves may be noisy).".to_owned());
        }
        Some(atr_pct) if atr_pct > 2.0 => {
            score -= 0.2;
            reasons.push("ATR very high (wild swings, risk of whipsaws).".to_owned());
        }
        Some(_) => {
            score += 0.2;
            reasons.push("ATR in normal range (volatility acceptable).".to_owned());
        }
        None => reasons.push("ATR data unavailable (insufficient candles).".to_owned()),
    }

    match row.bb_width_pct() {
        Some(width_pct) if width_pct < 0.5 => {
            score -= 0.2;
            reasons.push("Bollinger Bands very tight (squeeze / no clear direction).".to_owned());
        }
        Some(width_pct) if width_pct > 5.0 => {
            score -= 0.1;
            reasons.push("Bollinger Bands extremely wide (high volatility regime).".to_owned());
        }
        Some(_) => {
            score += 0.1;
            reasons.push("Bollinger Bands in normal range.".to_owned());
        }
        None => {}
    }

    f64::clamp(score, 0.0, 1.0)
}

fn candle_quality(row: &IndicatorRow, reasons: &mut Vec<String>) -> f64 {
    let candle = &row.candle;
    let body = (candle.close - candle.open).abs();
    let range = (candle.high - candle.low).max(1e-6);
    let upper_wick = candle.high - candle.close.max(candle.open);
    let lower_wick = candle.close.min(candle.open) - candle.low;

    let mut score = 0.0;

    if body / range > 0.6 {
        if candle.close > candle.open {
            score += 0.3;
            reasons.push("Strong bullish candle (large body, small wicks).".to_owned());
        } else {
            score -= 0.3;
            reasons.push("Strong bearish candle (large body, small wicks).".to_owned());
        }
    }

    if upper_wick > body * 1.5 {
        score -= 0.2;
        reasons.push("Long upper wick (selling pressure / possible fake breakout).".to_owned());
    }
    if lower_wick > body * 1.5 {
        score += 0.2;
        reasons.push("Long lower wick (buying support / rejection of lows).".to_owned());
    }

    f64::clamp(score, -1.0, 1.0)
}
