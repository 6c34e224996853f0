use super::{FlowData, GlobalCues, NewsSentiment};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Overall market mood on a `0..=100` scale, 50 being neutral.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct MarketMood(u8);

impl MarketMood {
    pub const NEUTRAL: Self = Self(50);

    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(value.round().clamp(0.0, 100.0) as u8)
        } else {
            Self::NEUTRAL
        }
    }

    pub fn value(&self) -> f64 {
        f64::from(self.0)
    }
}

impl Default for MarketMood {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Combine global cues, news, volatility and institutional flows into a [`MarketMood`].
///
/// Missing inputs contribute nothing.
pub fn compute_market_mood(
    global: Option<&GlobalCues>,
    news: Option<&NewsSentiment>,
    vix: Option<f64>,
    flows: Option<&FlowData>,
) -> MarketMood {
    let mut score = 50.0;

    if let Some(global) = global {
        if let Some(nasdaq) = global.nasdaq {
            score += nasdaq.change_pct * 2.0;
        }
        if let Some(nifty) = global.nifty_spot {
            score += nifty.change_pct * 3.0;
        }
    }

    match vix {
        Some(vix) if vix > 18.0 => score -= 10.0,
        Some(vix) if vix < 14.0 => score += 5.0,
        _ => {}
    }

    if let Some(flows) = flows {
        if flows.fii_net > 500.0 {
            score += 8.0;
        } else if flows.fii_net < -500.0 {
            score -= 8.0;
        }
    }

    if let Some(news) = news {
        score += news.sentiment_raw.clamp(-1.0, 1.0) * 10.0;
    }

    MarketMood::new(score)
}
