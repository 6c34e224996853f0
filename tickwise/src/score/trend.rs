use crate::indicator::IndicatorRow;
use serde::{Deserialize, Serialize};

/// Short-term trend of a single timeframe from the close/EMA9/EMA21 ordering.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Flat,
}

impl TrendDirection {
    /// `Up` if `close > ema9 > ema21`, `Down` if `close < ema9 < ema21`, otherwise `Flat`
    /// (including while either EMA is warming up).
    pub fn from_row(row: &IndicatorRow) -> Self {
        let close = row.close();
        match row.ema9.zip(row.ema21) {
            Some((ema9, ema21)) if close > ema9 && ema9 > ema21 => Self::Up,
            Some((ema9, ema21)) if close < ema9 && ema9 < ema21 => Self::Down,
            _ => Self::Flat,
        }
    }
}

/// Trend of the signal's own timeframe and of the higher confirmation timeframe.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
pub struct MultiTimeframe {
    pub tf1: TrendDirection,
    pub tf_higher: TrendDirection,
}
