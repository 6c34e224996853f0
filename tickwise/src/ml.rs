//! Normalisation of external multi-horizon ML predictions.
//!
//! The model itself lives outside this crate behind [`ProbabilityModel`]. Its output is
//! parsed leniently into [`MlPrediction`], blended into a single up-probability with
//! [`blend`], and optionally smoothed across calls by a [`SmoothedPredictor`].

use crate::{
    candle::Candle,
    error::{SignalError, UpstreamError},
};
use async_trait::async_trait;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use tracing::{debug, warn};

const NEUTRAL: f64 = 0.5;

/// Raw prediction as reported by the model, every field optional.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct MlPrediction {
    pub enabled: bool,
    pub p1: Option<f64>,
    pub p3: Option<f64>,
    pub p5: Option<f64>,
    pub final_ml_score: Option<f64>,
    pub reason: Option<String>,
}

impl MlPrediction {
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Parse a prediction without ever failing.
    ///
    /// Accepts `p1` or `next_1_up` (likewise for 3 and 5). Probabilities may be numbers or
    /// numeric strings; anything outside `[0, 1]` counts as missing. `enabled` defaults to
    /// true unless explicitly false, and a non-object input is treated as disabled.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::disabled("prediction is not an object");
        };

        let probability = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .find_map(|value| match value {
                    Value::Number(number) => number.as_f64(),
                    Value::String(text) => text.trim().parse::<f64>().ok(),
                    _ => None,
                })
                .filter(|probability| (0.0..=1.0).contains(probability))
        };

        Self {
            enabled: object.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            p1: probability(&["p1", "next_1_up"]),
            p3: probability(&["p3", "next_3_up"]),
            p5: probability(&["p5", "next_5_up"]),
            final_ml_score: probability(&["final_ml_score"]),
            reason: object
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }

    /// Strict parse for live model output.
    ///
    /// A payload that is not an object, or an enabled one without a single usable
    /// probability, is [`SignalError::MlDegraded`].
    pub fn try_from_value(value: &Value) -> Result<Self, SignalError> {
        if !value.is_object() {
            return Err(SignalError::MlDegraded("prediction is not an object".to_owned()));
        }

        let prediction = Self::from_value(value);
        let usable = [prediction.p1, prediction.p3, prediction.p5, prediction.final_ml_score]
            .iter()
            .any(Option::is_some);
        if prediction.enabled && !usable {
            return Err(SignalError::MlDegraded(
                "prediction carries no usable probability".to_owned(),
            ));
        }
        Ok(prediction)
    }
}

/// Normalised ML view consumed by the scorer and the conflict resolver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MlView {
    pub enabled: bool,
    pub p1: f64,
    pub p3: f64,
    pub p5: f64,
    pub final_ml_score: f64,
    pub trend_label: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MlView {
    /// Neutral view used whenever the model is unavailable.
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            p1: NEUTRAL,
            p3: NEUTRAL,
            p5: NEUTRAL,
            final_ml_score: NEUTRAL,
            trend_label: trend_label(NEUTRAL),
            reason: Some(reason.into()),
        }
    }

    /// Next-bar up-probability, neutral when disabled.
    pub fn up_probability(&self) -> f64 {
        if self.enabled { self.p1 } else { NEUTRAL }
    }

    /// Blended score if the view may influence decisions.
    pub fn active_score(&self) -> Option<f64> {
        self.enabled.then_some(self.final_ml_score)
    }
}

/// Human label for a blended up-probability.
pub fn trend_label(score: f64) -> SmolStr {
    let label = match score {
        score if score >= 0.7 => "Strong Bullish",
        score if score >= 0.6 => "Bullish",
        score if score >= 0.55 => "Mild Bullish",
        score if score <= 0.3 => "Strong Bearish",
        score if score <= 0.4 => "Bearish",
        score if score <= 0.45 => "Mild Bearish",
        _ => "Sideways / No Edge",
    };
    SmolStr::new_static(label)
}

/// Blend a prediction into an [`MlView`].
///
/// Missing horizons default to 0.5. Without a supplied overall score the horizons are
/// weighted `0.4·p1 + 0.35·p3 + 0.25·p5`.
pub fn blend(prediction: &MlPrediction) -> MlView {
    if !prediction.enabled {
        return MlView::disabled(
            prediction
                .reason
                .clone()
                .unwrap_or_else(|| "model disabled".to_owned()),
        );
    }

    let p1 = prediction.p1.unwrap_or(NEUTRAL);
    let p3 = prediction.p3.unwrap_or(NEUTRAL);
    let p5 = prediction.p5.unwrap_or(NEUTRAL);
    let final_ml_score = prediction
        .final_ml_score
        .unwrap_or(0.4 * p1 + 0.35 * p3 + 0.25 * p5);

    MlView {
        enabled: true,
        p1,
        p3,
        p5,
        final_ml_score,
        trend_label: trend_label(final_ml_score),
        reason: None,
    }
}

/// External model producing a raw multi-horizon prediction from recent candles.
#[async_trait]
pub trait ProbabilityModel: Send + Sync {
    async fn predict_next(&self, symbol: &str, history: &[Candle]) -> Result<Value, UpstreamError>;
}

/// Source of [`MlView`]s for the signal engine. Never fails; degraded output is disabled.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, symbol: &str, history: &[Candle]) -> MlView;
}

/// Predictor used when no model is configured.
#[derive(Debug, Copy, Clone, Default)]
pub struct DisabledPredictor;

#[async_trait]
impl Predictor for DisabledPredictor {
    async fn predict(&self, _: &str, _: &[Candle]) -> MlView {
        MlView::disabled("no model configured")
    }
}

/// Wraps a [`ProbabilityModel`] and smooths its blended score per symbol:
/// `final = 0.3·previous + 0.7·current`.
///
/// Smoothing state lives as long as the predictor instance.
#[derive(Debug)]
pub struct SmoothedPredictor<M> {
    model: M,
    previous: Mutex<FnvHashMap<SmolStr, f64>>,
}

impl<M> SmoothedPredictor<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            previous: Mutex::new(FnvHashMap::default()),
        }
    }

    fn smooth(&self, symbol: &str, current: f64) -> f64 {
        let mut previous = self.previous.lock();
        let smoothed = match previous.get(symbol) {
            Some(prev) => 0.3 * prev + 0.7 * current,
            None => current,
        };
        previous.insert(SmolStr::new(symbol), smoothed);
        smoothed
    }
}

#[async_trait]
impl<M> Predictor for SmoothedPredictor<M>
where
    M: ProbabilityModel,
{
    async fn predict(&self, symbol: &str, history: &[Candle]) -> MlView {
        let prediction = match self.model.predict_next(symbol, history).await {
            Ok(raw) => MlPrediction::try_from_value(&raw),
            Err(error) => Err(SignalError::from(error)),
        };
        let prediction = match prediction {
            Ok(prediction) => prediction,
            Err(error) => {
                warn!(symbol, %error, kind = ?error.kind(), "ML prediction degraded");
                return MlView::disabled(error.to_string());
            }
        };

        let mut view = blend(&prediction);
        if view.enabled {
            view.final_ml_score = self.smooth(symbol, view.final_ml_score);
            view.trend_label = trend_label(view.final_ml_score);
            debug!(symbol, score = view.final_ml_score, label = %view.trend_label, "ML view");
        }
        view
    }
}
