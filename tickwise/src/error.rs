use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All errors generated in `tickwise`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum SignalError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: SmolStr, value: f64 },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("upstream unavailable: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("ML prediction degraded: {0}")]
    MlDegraded(String),
}

/// Failure of an external collaborator (price feed, history, news, ML service, etc.).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum UpstreamError {
    #[error("{source_name} timed out after {secs}s")]
    Timeout { source_name: SmolStr, secs: u64 },

    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: SmolStr, reason: String },

    #[error("{source_name} returned unparseable data: {reason}")]
    Parse { source_name: SmolStr, reason: String },
}

/// Coarse error taxonomy used for logging and availability markers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientData,
    UpstreamUnavailable,
    InvalidValue,
    MlDegraded,
}

impl SignalError {
    pub fn invalid(field: &str, value: f64) -> Self {
        Self::InvalidValue {
            field: SmolStr::new(field),
            value,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalError::InvalidValue { .. } => ErrorKind::InvalidValue,
            SignalError::InsufficientData(_) => ErrorKind::InsufficientData,
            SignalError::Upstream(_) => ErrorKind::UpstreamUnavailable,
            SignalError::MlDegraded(_) => ErrorKind::MlDegraded,
        }
    }
}

impl UpstreamError {
    pub fn unavailable(source_name: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: SmolStr::new(source_name),
            reason: reason.into(),
        }
    }

    pub fn parse(source_name: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            source_name: SmolStr::new(source_name),
            reason: reason.into(),
        }
    }

    pub fn timeout(source_name: &str, secs: u64) -> Self {
        Self::Timeout {
            source_name: SmolStr::new(source_name),
            secs,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            UpstreamError::Timeout { source_name, .. }
            | UpstreamError::Unavailable { source_name, .. }
            | UpstreamError::Parse { source_name, .. } => source_name.as_str(),
        }
    }
}
