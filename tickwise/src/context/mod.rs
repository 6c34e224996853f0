//! Slow-changing market context that feeds the conflict resolver.
//!
//! Every source is optional: a failed or unconfigured source yields a neutral value
//! tagged as unavailable via [`Sourced`], so one failure never takes down the rest.

use crate::error::UpstreamError;
use async_trait::async_trait;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub mod mood;
pub mod regime;

pub use mood::{MarketMood, compute_market_mood};
pub use regime::{Regime, VixRisk, detect_regime, vix_risk_level};

/// Last price and day change of a reference market.
#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct MarketQuote {
    pub last: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct GlobalCues {
    pub nasdaq: Option<MarketQuote>,
    pub nifty_spot: Option<MarketQuote>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct NewsSentiment {
    pub headlines: Vec<String>,
    /// Aggregate sentiment in `[-1, 1]`.
    pub sentiment_raw: f64,
    pub summary: String,
}

/// Institutional flow summary.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct FlowData {
    /// Net institutional flow in crores.
    pub fii_net: f64,
    /// Normalised flow score in `[-1, 1]`.
    pub score: f64,
    pub label: String,
}

/// Sector support for a given symbol and intended action.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SectorView {
    /// `[-1, 1]`, positive when the symbol's sectors support the action.
    pub sector_score: f64,
    pub sector_comments: Vec<String>,
    pub sector_changes: FnvHashMap<SmolStr, f64>,
}

/// A context value paired with its availability.
///
/// Unavailable values carry the neutral default of `T` and the reason they are missing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

impl<T> Sourced<T> {
    pub fn available(value: T) -> Self {
        Self {
            value,
            unavailable: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// The value only if it came from the source.
    pub fn get(&self) -> Option<&T> {
        self.is_available().then_some(&self.value)
    }
}

impl<T: Default> Sourced<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            value: T::default(),
            unavailable: Some(reason.into()),
        }
    }
}

impl<T: Default> From<Result<T, UpstreamError>> for Sourced<T> {
    fn from(result: Result<T, UpstreamError>) -> Self {
        match result {
            Ok(value) => Self::available(value),
            Err(error) => Self::unavailable(error.to_string()),
        }
    }
}

/// External collaborator supplying market context.
///
/// Sources that a deployment does not configure keep the default implementation, which
/// reports them as unavailable.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Current value of the volatility index.
    async fn volatility_index(&self) -> Result<f64, UpstreamError> {
        Err(UpstreamError::unavailable("volatility_index", "not configured"))
    }

    async fn global_cues(&self) -> Result<GlobalCues, UpstreamError> {
        Err(UpstreamError::unavailable("global_cues", "not configured"))
    }

    async fn news(&self) -> Result<NewsSentiment, UpstreamError> {
        Err(UpstreamError::unavailable("news", "not configured"))
    }

    async fn flows(&self) -> Result<FlowData, UpstreamError> {
        Err(UpstreamError::unavailable("flows", "not configured"))
    }

    async fn sector(&self, _symbol: &str, _action: &str) -> Result<SectorView, UpstreamError> {
        Err(UpstreamError::unavailable("sector", "not configured"))
    }
}
