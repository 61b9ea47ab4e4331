use crate::domain::price::ProviderId;
use serde::Serialize;

/// One provider attempt that did not yield a usable quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no quote source available for {symbol}: {}", describe_attempts(.attempts))]
    SourceUnavailable {
        symbol: String,
        attempts: Vec<ProviderFailure>,
    },

    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

fn describe_attempts(attempts: &[ProviderFailure]) -> String {
    if attempts.is_empty() {
        return "no providers configured".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.message))
        .collect::<Vec<_>>()
        .join("; ")
}
