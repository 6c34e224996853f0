//! Final composite score: one number in `[0, 1]` blending the technical confidence with
//! every context input, plus a human label for the resolved action.
//!
//! Each input is mapped from its native range onto `[0, 1]` (`0.5` is neutral) before
//! weighting. Unavailable context contributes its neutral value. Event risk (upcoming
//! earnings) is not sourced and always counts as none.

use crate::{
    candle::Candle,
    context::{GlobalCues, VixRisk},
    score::Action,
};
use serde::Serialize;

const TECHNICAL_WEIGHT: f64 = 0.35;
const SECTOR_WEIGHT: f64 = 0.15;
const SENTIMENT_WEIGHT: f64 = 0.15;
const GLOBAL_WEIGHT: f64 = 0.10;
const FLOW_WEIGHT: f64 = 0.10;
const VOLUME_WEIGHT: f64 = 0.10;
const BREAKOUT_WEIGHT: f64 = 0.05;

/// Bonus when the ML score agrees with the action.
const ML_AGREEMENT_BONUS: f64 = 0.07;
/// Largest fractional reduction applied at maximum volatility-index risk.
const MAX_VIX_REDUCTION: f64 = 0.3;

/// Raw inputs, each in its native range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CompositeInputs {
    pub action: Action,
    /// Technical confidence, `[0, 1]`.
    pub technical: f64,
    /// `[-1, 1]`
    pub sector: f64,
    /// `[-1, 1]`
    pub sentiment: f64,
    /// `[-1, 1]`, see [`global_bias`].
    pub global: f64,
    /// `[-1, 1]`
    pub flow: f64,
    /// See [`volume_anomaly`].
    pub volume: f64,
    /// See [`fake_breakout`].
    pub breakout: f64,
    /// Active ML score, if any.
    pub ml_score: Option<f64>,
}

/// Per-input contribution after mapping onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CompositeComponents {
    pub technical: f64,
    pub sector: f64,
    pub sentiment: f64,
    pub global: f64,
    pub flow: f64,
    pub volume: f64,
    pub breakout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeScore {
    /// `[0, 1]`, two decimals.
    pub score: f64,
    pub label: &'static str,
    pub note: &'static str,
    pub components: CompositeComponents,
}

/// Map `[-1, 1]` onto `[0, 1]`.
fn unit(value: f64) -> f64 {
    (value.clamp(-1.0, 1.0) + 1.0) / 2.0
}

/// Blend `inputs` into a [`CompositeScore`] for the resolved action.
pub fn composite_score(inputs: &CompositeInputs, vix: &VixRisk) -> CompositeScore {
    let components = CompositeComponents {
        technical: inputs.technical.clamp(0.0, 1.0),
        sector: unit(inputs.sector),
        sentiment: unit(inputs.sentiment),
        global: unit(inputs.global),
        flow: unit(inputs.flow),
        volume: unit(inputs.volume),
        breakout: unit(inputs.breakout),
    };

    let mut score = TECHNICAL_WEIGHT * components.technical
        + SECTOR_WEIGHT * components.sector
        + SENTIMENT_WEIGHT * components.sentiment
        + GLOBAL_WEIGHT * components.global
        + FLOW_WEIGHT * components.flow
        + VOLUME_WEIGHT * components.volume
        + BREAKOUT_WEIGHT * components.breakout;

    let side = Side::of(inputs.action);
    let ml_agrees = inputs.ml_score.is_some_and(|ml| match side {
        Side::Long => ml > 0.60,
        Side::Short => ml < 0.40,
        Side::Flat => false,
    });
    if ml_agrees {
        score += ML_AGREEMENT_BONUS;
    }

    score *= 1.0 - vix.risk.clamp(0.0, 1.0) * MAX_VIX_REDUCTION;
    let score = (score.clamp(0.0, 1.0) * 100.0).round() / 100.0;

    let (label, note) = match side {
        Side::Long if score >= 0.75 => (
            "Strong Buy",
            "Technicals, sectors, global cues and news strongly favour longs.",
        ),
        Side::Long if score >= 0.6 => ("Buy (moderate)", "Bias is bullish but manage position size."),
        Side::Long => ("Cautious / Small Buy", "Bullish bias but setup is not very strong."),
        Side::Short if score >= 0.75 => (
            "Strong Sell",
            "Multiple factors align for downside, suitable for experienced traders.",
        ),
        Side::Short if score >= 0.6 => ("Sell (moderate)", "Bearish bias; use strict risk management."),
        Side::Short => ("Cautious / Hedge Only", "Bearish hints but not a very strong short."),
        Side::Flat => (
            "No Trade / Wait",
            "Signals, sectors or news are not aligned. Better to stay out.",
        ),
    };

    CompositeScore {
        score,
        label,
        note,
        components,
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum Side {
    Long,
    Short,
    Flat,
}

impl Side {
    fn of(action: Action) -> Self {
        match action {
            Action::Buy | Action::StrongBuy => Side::Long,
            Action::Sell | Action::StrongSell => Side::Short,
            Action::Wait => Side::Flat,
        }
    }
}

/// Directional bias from global markets in `[-1, 1]`.
///
/// Index spot beyond ±0.5% moves the bias by 0.3, the Nasdaq beyond ±0.7% by 0.2.
pub fn global_bias(cues: Option<&GlobalCues>) -> f64 {
    let Some(cues) = cues else {
        return 0.0;
    };

    let mut bias = 0.0;
    if let Some(spot) = &cues.nifty_spot {
        if spot.change_pct > 0.5 {
            bias += 0.3;
        } else if spot.change_pct < -0.5 {
            bias -= 0.3;
        }
    }
    if let Some(nasdaq) = &cues.nasdaq {
        if nasdaq.change_pct > 0.7 {
            bias += 0.2;
        } else if nasdaq.change_pct < -0.7 {
            bias -= 0.2;
        }
    }
    f64::clamp(bias, -1.0, 1.0)
}

/// Volume of the latest candle against the mean of the last 20.
///
/// `0.4` on a spike above 1.5x, `-0.2` when below half, `0.1` otherwise and `0.0` when the
/// latest candle carries no volume.
pub fn volume_anomaly(candles: &[Candle]) -> f64 {
    let Some(current) = candles.last().and_then(|candle| candle.volume) else {
        return 0.0;
    };

    let recent: Vec<f64> = candles
        .iter()
        .rev()
        .take(20)
        .filter_map(|candle| candle.volume)
        .collect();
    let mean = recent.iter().sum::<f64>() / recent.len() as f64;
    if !mean.is_finite() || mean <= 0.0 {
        return 0.0;
    }

    if current > mean * 1.5 {
        0.4
    } else if current < mean * 0.5 {
        -0.2
    } else {
        0.1
    }
}

/// `-0.4` when either wick of the latest candle exceeds 1.5x its body, `0.1` otherwise.
pub fn fake_breakout(candles: &[Candle]) -> f64 {
    let Some(candle) = candles.last() else {
        return 0.0;
    };

    let body = (candle.close - candle.open).abs();
    let upper_wick = candle.high - candle.close.max(candle.open);
    let lower_wick = candle.close.min(candle.open) - candle.low;
    if upper_wick > body * 1.5 || lower_wick > body * 1.5 {
        -0.4
    } else {
        0.1
    }
}
