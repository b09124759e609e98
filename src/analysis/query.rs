use crate::memory::VectorMemoryStore;
use crate::models::{entity_map, Analysis, AnalysisResult, AnalysisStrategy, HistoryMessage, Role};
use crate::nlp::NlpBackend;
use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use super::core::{NlpService, Registry};
use super::fallback::HybridChain;
use super::AnalyzeRequest;

/// Runs the individual strategies against one registry snapshot.
pub struct AnalysisOrchestrator<'a> {
    registry: &'a Registry,
    backend: &'a NlpBackend,
    memory: &'a VectorMemoryStore,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(registry: &'a Registry, backend: &'a NlpBackend, memory: &'a VectorMemoryStore) -> Self {
        Self {
            registry,
            backend,
            memory,
        }
    }

    pub fn run(&self, strategy: AnalysisStrategy, text: &str, session_id: Option<&str>) -> Result<Analysis> {
        match strategy {
            AnalysisStrategy::ExactMatch => Ok(self.exact_match(text)),
            AnalysisStrategy::SemanticSearch => self.semantic_search(text),
            AnalysisStrategy::IntentClassification => Ok(self.intent_classification(text)),
            AnalysisStrategy::ContextAware => self.context_aware(text, session_id),
            AnalysisStrategy::Hybrid => HybridChain::new().run(self, text, session_id),
        }
    }

    pub fn exact_match(&self, text: &str) -> Analysis {
        match self.registry.data_sources.exact_match(text) {
            Some(entry) => {
                debug!("Exact match in source '{}'", entry.source_name);
                Analysis::ExactMatch {
                    data_source: Some(entry.source_name.clone()),
                    matched: Some(entry.answer.clone()),
                    confidence: 1.0,
                }
            }
            None => Analysis::ExactMatch {
                data_source: None,
                matched: None,
                confidence: 0.0,
            },
        }
    }

    pub fn semantic_search(&self, text: &str) -> Result<Analysis> {
        let hits = self
            .registry
            .data_sources
            .search(self.backend.embedder.as_ref(), text, &[])?;

        Ok(match hits.first() {
            Some(best) => Analysis::SemanticSearch {
                data_source: Some(best.source.clone()),
                question: Some(best.question.clone()),
                answer: Some(best.answer.clone()),
                similarity: best.score,
                all_results: hits.clone(),
            },
            None => Analysis::SemanticSearch {
                data_source: None,
                question: None,
                answer: None,
                similarity: 0.0,
                all_results: Vec::new(),
            },
        })
    }

    pub fn intent_classification(&self, text: &str) -> Analysis {
        let result = self.registry.intent.classify(text);
        Analysis::IntentClassification {
            intent: result.intent,
            confidence: result.confidence,
            method: result.method,
        }
    }

    /// Similar turns of the session, entities of the text and the bot turns
    /// among them as context.
    pub fn context_aware(&self, text: &str, session_id: Option<&str>) -> Result<Analysis> {
        let relevant_history = match session_id {
            Some(session) if self.registry.semantic.enabled => self.memory.relevant(
                text,
                Some(session),
                self.registry.semantic.max_history_results,
            )?,
            _ => Vec::new(),
        };

        Ok(Analysis::ContextAware {
            entities: entity_map(&self.backend.entities.entities(text)),
            context_used: bot_context(&relevant_history),
            relevant_history,
        })
    }
}

/// The last two bot turns of `history`, joined with " | ".
pub(super) fn bot_context(history: &[HistoryMessage]) -> Option<String> {
    let bot: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::Bot)
        .map(|m| m.message.as_str())
        .collect();
    if bot.is_empty() {
        return None;
    }
    Some(bot[bot.len().saturating_sub(2)..].join(" | "))
}

impl NlpService {
    /// Generic strategy-selectable analysis. The request's strategy wins over
    /// the configured default.
    pub fn analyze_text(&self, request: &AnalyzeRequest) -> Result<AnalysisResult> {
        let registry = self.registry();
        let strategy = request.strategy.unwrap_or(registry.default_strategy);
        let prepared = self.prepare(request, &registry.semantic);

        let orchestrator = AnalysisOrchestrator::new(&registry, &self.backend, &self.memory);
        let analysis = orchestrator.run(strategy, &prepared.resolved, request.session_id.as_deref())?;
        info!(
            "🧭 {} analysis answered by {} (score {:.3})",
            strategy,
            analysis.strategy(),
            analysis.score()
        );

        Ok(AnalysisResult {
            original_text: prepared.original,
            resolved_text: prepared.resolved,
            rewritten: prepared.rewritten,
            session_id: request.session_id.clone(),
            strategy_used: strategy,
            timestamp: Utc::now(),
            analysis,
        })
    }
}
