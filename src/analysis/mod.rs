//! The analysis service: strategy orchestration, the hybrid fallback chain
//! and the domain-driven request path on top of the shared registries.

pub mod core;
pub mod fallback;
pub mod query;
pub mod request;

use crate::models::AnalysisStrategy;
use serde::Deserialize;

pub use self::core::{
    ConfigureRequest, ConfigureSummary, DomainListing, HealthReport, IntentAnswer, NlpService, Registry,
};
pub use fallback::HybridChain;
pub use query::AnalysisOrchestrator;

/// One user turn with the conversational context the caller knows about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prev_bot_response: Option<String>,
    #[serde(default)]
    pub last_user_message: Option<String>,
    /// Overrides the configured default strategy for the generic path.
    #[serde(default)]
    pub strategy: Option<AnalysisStrategy>,
}

impl AnalyzeRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn prev_bot(mut self, text: impl Into<String>) -> Self {
        self.prev_bot_response = Some(text.into());
        self
    }

    pub fn strategy(mut self, strategy: AnalysisStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Text after the common pre-step: user turn persisted, coreference resolved.
#[derive(Debug, Clone)]
pub struct PreparedText {
    pub original: String,
    pub resolved: String,
    pub rewritten: Option<String>,
}
