//! Tickwise - near-real-time trading signal pipeline
//!
//! Turns a stream of price ticks for an index or stock into a single BUY / SELL / WAIT
//! recommendation with confidence and rationale:
//!
//! ticks -> [`candle`] aggregation -> [`indicator`] pipeline -> [`score`] engine (+ [`ml`]
//! blend) -> [`conflict`] resolution -> [`Signal`]
//!
//! Each report also carries advisory [`reversal`] hints and a [`composite`] score that
//! blends the signal with its market context.
//!
//! Slow-changing market context (volatility index, global cues, news, institutional flows)
//! is kept fresh by the background [`cache::ContextRefresher`] and read from the shared
//! [`cache::ContextStore`] without blocking evaluation.
pub mod cache;
pub mod candle;
pub mod composite;
pub mod conflict;
pub mod context;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod ml;
pub mod reversal;
pub mod score;
pub mod validate;

// Re-export commonly used types for convenience
pub use candle::{Candle, CandleAggregator};
pub use engine::{EngineConfig, SignalEngine, SignalReport};
pub use error::{SignalError, UpstreamError};
pub use indicator::{IndicatorPipeline, IndicatorRow};
pub use score::{Action, ScoreEngine, Signal};
