use thiserror::Error;

/// Failures surfaced to callers of the service. Component-local problems
/// (a corpus that will not load, a classifier that throws) never reach this
/// type; they degrade inside the component instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Domain '{name}' not found. Available domains: {available:?}")]
    UnknownDomain { name: String, available: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
