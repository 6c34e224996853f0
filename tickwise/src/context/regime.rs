use crate::indicator::IndicatorRow;
use serde::{Deserialize, Serialize};

/// Volatility-index risk band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VixRisk {
    pub risk: f64,
    pub label: &'static str,
    pub comment: &'static str,
}

pub fn vix_risk_level(vix: Option<f64>) -> VixRisk {
    let (risk, label, comment) = match vix.filter(|vix| vix.is_finite()) {
        None => (0.2, "Unknown", "Unable to fetch VIX."),
        Some(vix) if vix < 12.0 => (0.2, "Low", "Low volatility, signals are more reliable."),
        Some(vix) if vix < 18.0 => (0.5, "Medium", "Volatility moderate, good for intraday."),
        Some(_) => (0.9, "High", "High VIX, expect whipsaws and false breakouts."),
    };
    VixRisk {
        risk,
        label,
        comment,
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Regime {
    pub label: String,
    /// `[-1, 1]`
    pub score: f64,
    pub atr_pct: Option<f64>,
    pub bb_pct: Option<f64>,
}

/// Classify the volatility regime of `row`, nudged by the ML trend label.
pub fn detect_regime(row: &IndicatorRow, ml_label: Option<&str>) -> Regime {
    let atr_pct = row.atr_pct();
    let bb_pct = row.bb_width_pct();

    let (mut label, mut score) = match atr_pct.zip(bb_pct) {
        Some((atr, bb)) if atr < 0.5 && bb < 1.0 => ("Low Volatility", -0.3),
        Some((atr, bb)) if atr > 1.5 && bb > 3.5 => ("High Volatility", 0.2),
        _ => ("Normal Volatility", 0.0),
    };

    if let Some(ml_label) = ml_label {
        if ml_label.contains("Strong Bullish") || ml_label.contains("Strong Bearish") {
            score += 0.4;
            label = "Trending";
        } else if ml_label.contains("Bullish") || ml_label.contains("Bearish") {
            score += 0.2;
        }
    }

    Regime {
        label: label.to_owned(),
        score: f64::clamp(score, -1.0, 1.0),
        atr_pct,
        bb_pct,
    }
}
