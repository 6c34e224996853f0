//! Reconciles the heuristic [`Signal`] with ML, market mood, sector and higher-timeframe
//! context.
//!
//! Rules are evaluated in order and the first match wins. Contradictions downgrade a trade
//! to `WAIT`; full agreement escalates it to `STRONG_BUY` / `STRONG_SELL`. When ML is
//! disabled its up-probability is neutral (0.5), so ML-driven rules cannot fire.

use crate::{
    context::{MarketMood, SectorView},
    ml::MlView,
    score::{Action, Signal, TrendDirection},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Resolution {
    pub action: Action,
    /// Reasons of the input signal followed by the reason of the rule that fired, if any.
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConflictResolver {
    pub ml_contradicts_buy_below: f64,
    pub ml_contradicts_sell_above: f64,
    pub min_buy_mood: f64,
    pub sector_against: f64,
    pub confluence_ml: f64,
    pub confluence_buy_mood: f64,
    pub confluence_sell_mood: f64,
    pub confluence_sector: f64,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self {
            ml_contradicts_buy_below: 0.45,
            ml_contradicts_sell_above: 0.55,
            min_buy_mood: 40.0,
            sector_against: 0.3,
            confluence_ml: 0.70,
            confluence_buy_mood: 65.0,
            confluence_sell_mood: 35.0,
            confluence_sector: 0.2,
        }
    }
}

impl ConflictResolver {
    pub fn resolve(
        &self,
        signal: &Signal,
        ml: &MlView,
        market_mood: MarketMood,
        sector: &SectorView,
    ) -> Resolution {
        let mut reasons = signal.reasons.clone();
        let (action, reason) = self.apply_rules(signal, ml, market_mood, sector);

        if let Some(reason) = reason {
            debug!(from = %signal.action, to = %action, reason, "conflict rule fired");
            reasons.push(reason.to_owned());
        }
        Resolution { action, reasons }
    }

    fn apply_rules(
        &self,
        signal: &Signal,
        ml: &MlView,
        market_mood: MarketMood,
        sector: &SectorView,
    ) -> (Action, Option<&'static str>) {
        let base = signal.action;
        let ml_up = ml.up_probability();
        let ml_down = 1.0 - ml_up;
        let mood = market_mood.value();
        let sector_score = sector.sector_score;
        let higher = signal.mtf.tf_higher;

        let fired = match base {
            Action::Buy if ml_up < self.ml_contradicts_buy_below => {
                (Action::Wait, "ML contradicts BUY, switching to WAIT.")
            }
            Action::Sell if ml_up > self.ml_contradicts_sell_above => {
                (Action::Wait, "ML contradicts SELL, switching to WAIT.")
            }
            Action::Buy if mood < self.min_buy_mood => {
                (Action::Wait, "Market mood too weak for BUY, switching to WAIT.")
            }
            Action::Buy if sector_score < -self.sector_against => {
                (Action::Wait, "Sector not supporting the trade, switching to WAIT.")
            }
            Action::Sell if sector_score > self.sector_against => {
                (Action::Wait, "Sector contradicts SELL, switching to WAIT.")
            }
            Action::Buy if higher == TrendDirection::Down => {
                (Action::Wait, "Higher timeframe trend bearish, switching to WAIT.")
            }
            Action::Sell if higher == TrendDirection::Up => {
                (Action::Wait, "Higher timeframe trend bullish, switching to WAIT.")
            }
            Action::Buy
                if ml_up > self.confluence_ml
                    && mood > self.confluence_buy_mood
                    && sector_score > self.confluence_sector =>
            {
                (Action::StrongBuy, "Perfect confluence, STRONG BUY.")
            }
            Action::Sell
                if ml_down > self.confluence_ml
                    && mood < self.confluence_sell_mood
                    && sector_score < -self.confluence_sector =>
            {
                (Action::StrongSell, "Perfect confluence, STRONG SELL.")
            }
            _ => return (base, None),
        };

        (fired.0, Some(fired.1))
    }
}
