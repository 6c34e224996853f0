use serde::{Deserialize, Serialize};

/// Combination weights and decision thresholds of the [`ScoreEngine`](super::ScoreEngine).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub trend_weight: f64,
    pub momentum_weight: f64,
    pub candle_weight: f64,

    /// Weight of `|directional|` in the base confidence; volatility quality gets the rest.
    pub direction_confidence_weight: f64,

    pub ml_bullish_above: f64,
    pub ml_bearish_below: f64,
    pub ml_boost: f64,

    pub action_score_min: f64,
    pub action_confidence_min: f64,

    /// ATR above this fraction of price is treated as a high volatility regime.
    pub high_atr_fraction: f64,
    pub high_atr_penalty: f64,

    /// `|ema9 - ema21|` below this fraction of price is a chop zone.
    pub chop_spread_fraction: f64,
    pub chop_confidence: f64,

    pub min_volatility_quality: f64,
    pub volatility_override_confidence: f64,
    pub min_directional: f64,
    pub wait_confidence_cap: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            trend_weight: 0.5,
            momentum_weight: 0.3,
            candle_weight: 0.2,
            direction_confidence_weight: 0.7,
            ml_bullish_above: 0.65,
            ml_bearish_below: 0.35,
            ml_boost: 0.15,
            action_score_min: 0.4,
            action_confidence_min: 0.55,
            high_atr_fraction: 0.01,
            high_atr_penalty: 0.15,
            chop_spread_fraction: 0.0004,
            chop_confidence: 0.1,
            min_volatility_quality: 0.3,
            volatility_override_confidence: 0.7,
            min_directional: 0.25,
            wait_confidence_cap: 0.4,
        }
    }
}
