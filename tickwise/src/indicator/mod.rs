//! Rolling technical indicators over an ordered candle sequence.
//!
//! Every indicator is incremental: it folds one bar at a time and reports `None` until its
//! window holds enough samples. [`IndicatorPipeline`] wires them together and emits one
//! [`IndicatorRow`] per candle.

use crate::{candle::Candle, error::SignalError};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod supertrend;
pub mod window;

pub use atr::Atr;
pub use bollinger::{BollingerBands, BollingerOutput};
pub use ema::Ema;
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use supertrend::{Side, Supertrend};

/// Candle fields plus every indicator computed for it.
///
/// Indicator fields are `None` while the underlying window is warming up, never a
/// placeholder zero.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct IndicatorRow {
    #[serde(flatten)]
    pub candle: Candle,
    pub ema9: Option<f64>,
    pub ema21: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub atr14: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_width: Option<f64>,
    pub bb_percent: Option<f64>,
    pub supertrend: Option<f64>,
}

impl IndicatorRow {
    /// Row with every indicator unset.
    pub fn from_candle(candle: Candle) -> Self {
        Self {
            candle,
            ema9: None,
            ema21: None,
            ema50: None,
            ema200: None,
            rsi14: None,
            macd: None,
            macd_signal: None,
            macd_hist: None,
            atr14: None,
            bb_upper: None,
            bb_lower: None,
            bb_width: None,
            bb_percent: None,
            supertrend: None,
        }
    }

    pub fn close(&self) -> f64 {
        self.candle.close
    }

    /// ATR as a percentage of the close.
    pub fn atr_pct(&self) -> Option<f64> {
        self.atr14
            .filter(|_| self.candle.close > 0.0)
            .map(|atr| atr / self.candle.close * 100.0)
    }

    /// Bollinger width as a percentage (width is already relative to the middle band).
    pub fn bb_width_pct(&self) -> Option<f64> {
        self.bb_width.map(|width| width * 100.0)
    }

    /// Validate the row once at the boundary.
    ///
    /// Non-finite or non-positive OHLC is rejected; non-finite indicator values are
    /// downgraded to `None`.
    pub fn validated(mut self) -> Result<Self, SignalError> {
        let ohlc = [
            ("open", self.candle.open),
            ("high", self.candle.high),
            ("low", self.candle.low),
            ("close", self.candle.close),
        ];
        if let Some((field, value)) = ohlc
            .into_iter()
            .find(|(_, value)| !value.is_finite() || *value <= 0.0)
        {
            return Err(SignalError::invalid(field, value));
        }

        for (field, slot) in self.indicator_fields_mut() {
            if let Some(value) = *slot {
                if !value.is_finite() {
                    warn!(field, value, "dropping non-finite indicator value");
                    *slot = None;
                }
            }
        }
        Ok(self)
    }

    fn indicator_fields_mut(&mut self) -> [(&'static str, &mut Option<f64>); 14] {
        [
            ("ema9", &mut self.ema9),
            ("ema21", &mut self.ema21),
            ("ema50", &mut self.ema50),
            ("ema200", &mut self.ema200),
            ("rsi14", &mut self.rsi14),
            ("macd", &mut self.macd),
            ("macd_signal", &mut self.macd_signal),
            ("macd_hist", &mut self.macd_hist),
            ("atr14", &mut self.atr14),
            ("bb_upper", &mut self.bb_upper),
            ("bb_lower", &mut self.bb_lower),
            ("bb_width", &mut self.bb_width),
            ("bb_percent", &mut self.bb_percent),
            ("supertrend", &mut self.supertrend),
        ]
    }
}

/// Stateful bundle of every indicator the scorer consumes.
#[derive(Debug, Clone)]
pub struct IndicatorPipeline {
    ema9: Ema,
    ema21: Ema,
    ema50: Ema,
    ema200: Ema,
    rsi14: Rsi,
    macd: Macd,
    atr14: Atr,
    bollinger: BollingerBands,
    supertrend: Supertrend,
}

impl Default for IndicatorPipeline {
    fn default() -> Self {
        Self {
            ema9: Ema::new(9),
            ema21: Ema::new(21),
            ema50: Ema::new(50),
            ema200: Ema::new(200),
            rsi14: Rsi::new(14),
            macd: Macd::new(12, 26, 9),
            atr14: Atr::new(14),
            bollinger: BollingerBands::new(20, 2.0),
            supertrend: Supertrend::new(14, 3.0),
        }
    }
}

impl IndicatorPipeline {
    /// One row per candle, in order.
    pub fn compute(candles: &[Candle]) -> Vec<IndicatorRow> {
        let mut pipeline = Self::default();
        candles.iter().map(|candle| pipeline.update(candle)).collect()
    }

    pub fn update(&mut self, candle: &Candle) -> IndicatorRow {
        let Candle {
            high, low, close, ..
        } = *candle;

        let macd = self.macd.update(close);
        let bollinger = self.bollinger.update(close);

        IndicatorRow {
            candle: *candle,
            ema9: self.ema9.update(close),
            ema21: self.ema21.update(close),
            ema50: self.ema50.update(close),
            ema200: self.ema200.update(close),
            rsi14: self.rsi14.update(close),
            macd: macd.line,
            macd_signal: macd.signal,
            macd_hist: macd.hist,
            atr14: self.atr14.update(high, low, close),
            bb_upper: bollinger.map(|bb| bb.upper),
            bb_lower: bollinger.map(|bb| bb.lower),
            bb_width: bollinger.map(|bb| bb.width),
            bb_percent: bollinger.map(|bb| bb.percent),
            supertrend: self
                .supertrend
                .update(high, low, close)
                .map(|(value, _)| value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn uptrend(len: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 9, 15, 0).unwrap();
        (0..len)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1 + (i as f64 * 0.9).sin() * 0.3;
                Candle {
                    start_ts: start + TimeDelta::minutes(i as i64),
                    open: close - 0.05,
                    high: close + 0.2,
                    low: close - 0.25,
                    close,
                    volume: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_warmup_nulls_then_finite() {
        struct TestCase {
            field: &'static str,
            first_value_index: usize,
            get: fn(&IndicatorRow) -> Option<f64>,
        }

        let rows = IndicatorPipeline::compute(&uptrend(250));
        assert_eq!(rows.len(), 250);

        let cases = vec![
            // TC0: span 9
            TestCase { field: "ema9", first_value_index: 8, get: |row| row.ema9 },
            // TC1: window 14
            TestCase { field: "rsi14", first_value_index: 14, get: |row| row.rsi14 },
            // TC2: window 14
            TestCase { field: "atr14", first_value_index: 14, get: |row| row.atr14 },
            // TC3: window 20
            TestCase { field: "bb_width", first_value_index: 19, get: |row| row.bb_width },
            // TC4: span 200
            TestCase { field: "ema200", first_value_index: 199, get: |row| row.ema200 },
            // TC5: slow EMA warm
            TestCase { field: "macd", first_value_index: 25, get: |row| row.macd },
            // TC6: 9 line values after the slow EMA warms
            TestCase { field: "macd_signal", first_value_index: 33, get: |row| row.macd_signal },
            // TC7: follows ATR
            TestCase { field: "supertrend", first_value_index: 14, get: |row| row.supertrend },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            for (row_index, row) in rows.iter().enumerate() {
                let value = (test.get)(row);
                if row_index < test.first_value_index {
                    assert_eq!(value, None, "TC{} failed: {} row {}", index, test.field, row_index);
                } else {
                    let value = value.unwrap_or(f64::NAN);
                    assert!(
                        value.is_finite(),
                        "TC{} failed: {} row {}",
                        index,
                        test.field,
                        row_index
                    );
                }
            }
        }
    }

    #[test]
    fn test_validated_rejects_bad_ohlc_and_drops_non_finite_indicators() {
        let mut row = IndicatorPipeline::compute(&uptrend(30))[29];
        row.rsi14 = Some(f64::NAN);
        row.atr14 = Some(f64::INFINITY);

        let validated = row.validated().unwrap();
        assert_eq!(validated.rsi14, None);
        assert_eq!(validated.atr14, None);
        assert!(validated.ema21.is_some());

        let mut bad = row;
        bad.candle.close = 0.0;
        assert_eq!(
            bad.validated(),
            Err(SignalError::InvalidValue {
                field: "close".into(),
                value: 0.0
            })
        );
    }

    #[test]
    fn test_percentage_helpers() {
        let mut row = IndicatorRow::from_candle(uptrend(1)[0]);
        assert_eq!(row.atr_pct(), None);

        row.candle.close = 200.0;
        row.atr14 = Some(2.0);
        row.bb_width = Some(0.015);
        assert_eq!(row.atr_pct(), Some(1.0));
        assert_eq!(row.bb_width_pct(), Some(1.5));
    }
}
