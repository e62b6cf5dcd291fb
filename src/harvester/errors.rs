use crate::harvester::config::ConfigError;
use crate::harvester::writer_backend::WriterError;

/// Fatal conditions: each one aborts the harvest run
#[derive(Debug)]
pub enum HarvestError {
    Config(ConfigError),
    Upstream(String),
    Persistence(WriterError),
}

impl From<ConfigError> for HarvestError {
    fn from(err: ConfigError) -> Self {
        HarvestError::Config(err)
    }
}

impl From<WriterError> for HarvestError {
    fn from(err: WriterError) -> Self {
        HarvestError::Persistence(err)
    }
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarvestError::Config(e) => write!(f, "Configuration error: {}", e),
            HarvestError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            HarvestError::Persistence(e) => write!(f, "Persistence error: {}", e),
        }
    }
}

impl std::error::Error for HarvestError {}

/// Per-signature conditions that drop one transaction and nothing else
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    FetchFailed(String),
    NotFound,
    ExecutionFailure,
    NoRelevantDelta,
    MissingTimestamp,
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::FetchFailed(msg) => write!(f, "fetch failed: {}", msg),
            SkipReason::NotFound => write!(f, "transaction not found"),
            SkipReason::ExecutionFailure => write!(f, "transaction failed on-chain"),
            SkipReason::NoRelevantDelta => write!(f, "no router balance change"),
            SkipReason::MissingTimestamp => write!(f, "missing block time"),
            SkipReason::Cancelled => write!(f, "cancelled before fetch"),
        }
    }
}
