use crate::{error::SignalError, indicator::IndicatorRow};
use tracing::warn;

/// Largest accepted move against the previous close, in percent.
pub const MAX_MOVE_PCT: f64 = 40.0;

/// Consecutive mutually consistent rejections after which the guard accepts the new level.
pub const REANCHOR_AFTER: u32 = 3;

/// Reject non-finite or non-positive prices, and moves of more than [`MAX_MOVE_PCT`]
/// against `prev_close`.
pub fn validate_price(price: f64, prev_close: Option<f64>) -> Result<f64, SignalError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(SignalError::invalid("price", price));
    }

    if let Some(prev_close) = prev_close {
        if !prev_close.is_finite() || prev_close <= 0.0 {
            return Err(SignalError::invalid("prev_close", prev_close));
        }
        let change_pct = ((price - prev_close) / prev_close * 100.0).abs();
        if change_pct > MAX_MOVE_PCT {
            return Err(SignalError::invalid("price_change_pct", change_pct));
        }
    }

    Ok(price)
}

/// Per-aggregator move check that recovers from a stale reference close.
///
/// A tick rejected by [`validate_price`] is remembered. Once [`REANCHOR_AFTER`] rejected
/// ticks in a row each sit within [`MAX_MOVE_PCT`] of the one before, the market has moved
/// and the latest tick is accepted as the new reference. Non-finite and non-positive prices
/// never count towards re-anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceGuard {
    pending: Option<f64>,
    streak: u32,
}

impl PriceGuard {
    pub fn check(&mut self, price: f64, prev_close: Option<f64>) -> Result<f64, SignalError> {
        let error = match validate_price(price, prev_close) {
            Ok(price) => {
                *self = Self::default();
                return Ok(price);
            }
            Err(error) => error,
        };

        // Bad reference or bad tick: nothing to learn from it
        validate_price(price, None)?;
        if prev_close.is_none_or(|prev| !prev.is_finite() || prev <= 0.0) {
            return Err(error);
        }

        let agrees = self
            .pending
            .is_some_and(|pending| validate_price(price, Some(pending)).is_ok());
        self.streak = if agrees { self.streak + 1 } else { 1 };
        self.pending = Some(price);

        if self.streak >= REANCHOR_AFTER {
            warn!(
                price,
                ?prev_close,
                streak = self.streak,
                "re-anchoring price after sustained move"
            );
            *self = Self::default();
            return Ok(price);
        }
        Err(error)
    }
}

/// Whether `row` carries enough indicators to explain a signal: EMA21 plus at least one
/// momentum indicator.
pub fn can_generate_reasoning(row: &IndicatorRow) -> Result<(), SignalError> {
    if row.ema21.is_none() {
        return Err(SignalError::InsufficientData(
            "insufficient candles for EMA calculation".to_owned(),
        ));
    }
    if row.rsi14.is_none() && row.macd.is_none() {
        return Err(SignalError::InsufficientData(
            "insufficient candles for momentum indicators".to_owned(),
        ));
    }
    Ok(())
}
