use super::atr::Atr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
struct Bands {
    upper: f64,
    lower: f64,
    side: Side,
    close: f64,
}

/// Supertrend on `hl2 ± multiplier·ATR`.
///
/// Final bands only tighten while price stays inside them. A close through the active band
/// flips the side, and the reported value is the band on the active side (lower band while
/// `Up`, upper band while `Down`).
#[derive(Debug, Clone)]
pub struct Supertrend {
    atr: Atr,
    multiplier: f64,
    prev: Option<Bands>,
}

impl Supertrend {
    pub fn new(window: usize, multiplier: f64) -> Self {
        Self {
            atr: Atr::new(window),
            multiplier,
            prev: None,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<(f64, Side)> {
        let atr = self.atr.update(high, low, close)?;
        let hl2 = (high + low) / 2.0;
        let basic_upper = hl2 + self.multiplier * atr;
        let basic_lower = hl2 - self.multiplier * atr;

        let bands = match self.prev {
            None => Bands {
                upper: basic_upper,
                lower: basic_lower,
                side: if close >= hl2 { Side::Up } else { Side::Down },
                close,
            },
            Some(prev) => {
                let upper = if basic_upper < prev.upper || prev.close > prev.upper {
                    basic_upper
                } else {
                    prev.upper
                };
                let lower = if basic_lower > prev.lower || prev.close < prev.lower {
                    basic_lower
                } else {
                    prev.lower
                };
                let side = match prev.side {
                    Side::Up if close < lower => Side::Down,
                    Side::Down if close > upper => Side::Up,
                    side => side,
                };
                Bands {
                    upper,
                    lower,
                    side,
                    close,
                }
            }
        };

        self.prev = Some(bands);
        Some(match bands.side {
            Side::Up => (bands.lower, Side::Up),
            Side::Down => (bands.upper, Side::Down),
        })
    }
}
