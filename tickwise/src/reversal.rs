//! Early-warning reversal hints from the two most recent indicator rows.
//!
//! Hints are advisory: they are reported next to the signal and never change its action.

use crate::indicator::IndicatorRow;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Rows required before any hint is reported.
pub const MIN_ROWS: usize = 10;

/// Wick longer than this multiple of the body counts as a rejection.
const WICK_BODY_RATIO: f64 = 1.2;

/// Bollinger width (percent of the middle band) below which bands count as squeezed.
const SQUEEZE_WIDTH_PCT: f64 = 0.5;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum ReversalHint {
    #[display("Bearish MACD reversal detected.")]
    BearishMacdFlip,
    #[display("Bullish MACD reversal detected.")]
    BullishMacdFlip,
    #[display("Momentum weakening (RSI dropping).")]
    RsiWeakening,
    #[display("Momentum improving (RSI rising).")]
    RsiImproving,
    #[display("Upper wick rejection -> downside pressure.")]
    UpperWickRejection,
    #[display("Lower wick rejection -> upside pressure.")]
    LowerWickRejection,
    #[display("Low volatility squeeze -> breakout likely soon.")]
    VolatilitySqueeze,
}

/// Reversal hints for the latest row of `rows`, oldest first.
///
/// Empty with fewer than [`MIN_ROWS`] rows. A check whose indicators are still warming up
/// is skipped rather than read as zero.
pub fn detect_reversal(rows: &[IndicatorRow]) -> Vec<ReversalHint> {
    let [.., prev, last] = rows else {
        return Vec::new();
    };
    if rows.len() < MIN_ROWS {
        return Vec::new();
    }

    let mut hints = Vec::new();

    if let Some((prev_hist, last_hist)) = prev.macd_hist.zip(last.macd_hist) {
        if prev_hist > 0.0 && last_hist < 0.0 {
            hints.push(ReversalHint::BearishMacdFlip);
        }
        if prev_hist < 0.0 && last_hist > 0.0 {
            hints.push(ReversalHint::BullishMacdFlip);
        }
    }

    if let Some((prev_rsi, last_rsi)) = prev.rsi14.zip(last.rsi14) {
        if prev_rsi > 60.0 && last_rsi < 55.0 {
            hints.push(ReversalHint::RsiWeakening);
        }
        if prev_rsi < 40.0 && last_rsi > 45.0 {
            hints.push(ReversalHint::RsiImproving);
        }
    }

    let candle = &last.candle;
    let body = (candle.close - candle.open).abs();
    let upper_wick = candle.high - candle.open.max(candle.close);
    let lower_wick = candle.open.min(candle.close) - candle.low;
    if upper_wick > body * WICK_BODY_RATIO {
        hints.push(ReversalHint::UpperWickRejection);
    }
    if lower_wick > body * WICK_BODY_RATIO {
        hints.push(ReversalHint::LowerWickRejection);
    }

    if last
        .bb_width_pct()
        .is_some_and(|width| width > 0.0 && width < SQUEEZE_WIDTH_PCT)
    {
        hints.push(ReversalHint::VolatilitySqueeze);
    }

    hints
}
