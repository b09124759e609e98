use crate::models::{Analysis, AnalysisStrategy};
use anyhow::Result;
use tracing::{debug, info, warn};

use super::query::AnalysisOrchestrator;

/// One step of the hybrid chain: accepted when its score is strictly above
/// `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridStage {
    pub strategy: AnalysisStrategy,
    pub threshold: f32,
}

/// Exact match, then semantic search, then intent classification, each
/// gated by its own threshold, with context-aware analysis as the
/// unconditional last resort.
///
/// These thresholds belong to the chain alone; domain thresholds never
/// feed into it.
pub struct HybridChain {
    stages: Vec<HybridStage>,
}

impl Default for HybridChain {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridChain {
    pub fn new() -> Self {
        Self {
            stages: vec![
                HybridStage {
                    strategy: AnalysisStrategy::ExactMatch,
                    threshold: 0.9,
                },
                HybridStage {
                    strategy: AnalysisStrategy::SemanticSearch,
                    threshold: 0.8,
                },
                HybridStage {
                    strategy: AnalysisStrategy::IntentClassification,
                    threshold: 0.7,
                },
            ],
        }
    }

    pub fn stages(&self) -> &[HybridStage] {
        &self.stages
    }

    pub fn run(&self, orchestrator: &AnalysisOrchestrator<'_>, text: &str, session_id: Option<&str>) -> Result<Analysis> {
        for stage in &self.stages {
            match orchestrator.run(stage.strategy, text, session_id) {
                Ok(analysis) if analysis.score() > stage.threshold => {
                    info!("✅ Hybrid chain settled on {} ({:.3})", stage.strategy, analysis.score());
                    return Ok(analysis);
                }
                Ok(analysis) => debug!(
                    "{} scored {:.3}, not above {:.2}",
                    stage.strategy,
                    analysis.score(),
                    stage.threshold
                ),
                Err(e) => warn!("❌ {} stage failed: {:#}", stage.strategy, e),
            }
        }

        debug!("Hybrid chain falling back to context-aware analysis");
        orchestrator.context_aware(text, session_id)
    }
}
