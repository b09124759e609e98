use crate::models::{entity_map, Decision, DecisionResponse, Role};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::core::NlpService;
use super::query::bot_context;
use super::AnalyzeRequest;

/// Recent session turns scanned for bot context before the corpus search.
const CONTEXT_WINDOW: usize = 3;
/// Similar session turns attached to a model-path decision.
const RELEVANT_TURNS: usize = 5;

impl NlpService {
    /// The domain-driven decision: intent lookup table, then the domain
    /// corpus above the domain's similarity threshold, then intent
    /// classification with entities and history for a downstream model.
    pub fn analyze(&self, request: &AnalyzeRequest) -> DecisionResponse {
        let registry = self.registry();
        let domain = self.active_domain();
        let prepared = self.prepare(request, &registry.semantic);
        let text = prepared.resolved.as_str();
        let session_id = request.session_id.as_deref();

        let decision = if let Some(intent) = domain.lookup_intent(text) {
            info!("📋 Intent table hit in domain '{}': {}", domain.name(), intent);
            Decision::CsvLookup {
                intent: intent.to_string(),
                matched_question: text.to_string(),
            }
        } else if let Some(decision) = self.corpus_answer(&domain, text, session_id) {
            decision
        } else {
            let relevant_history = match session_id {
                Some(session) => self
                    .memory
                    .relevant(text, Some(session), RELEVANT_TURNS)
                    .unwrap_or_else(|e| {
                        warn!("⚠️  History retrieval failed: {:#}", e);
                        Vec::new()
                    }),
                None => Vec::new(),
            };
            debug!("Retrieved {} relevant turns", relevant_history.len());

            let intent = registry.intent.classify(text);
            Decision::Llm {
                intent: intent.intent,
                method: intent.method,
                confidence: intent.confidence,
                domain_threshold: domain.profile().intent_confidence_threshold,
                entities: entity_map(&self.backend.entities.entities(text)),
                context_used: bot_context(&relevant_history),
                relevant_history,
            }
        };

        DecisionResponse {
            decision,
            original_text: prepared.original,
            resolved_text: prepared.resolved,
            rewritten: prepared.rewritten,
            domain: domain.name().to_string(),
            timestamp: Utc::now(),
        }
    }

    fn corpus_answer(
        &self,
        domain: &crate::domain::ActiveDomain,
        text: &str,
        session_id: Option<&str>,
    ) -> Option<Decision> {
        let context: Vec<String> = session_id
            .map(|session| {
                self.memory
                    .session_history(session, CONTEXT_WINDOW)
                    .into_iter()
                    .filter(|m| m.role == Role::Bot)
                    .map(|m| m.message)
                    .collect()
            })
            .unwrap_or_default();

        let (entry, score) = match domain.closest(self.backend.embedder.as_ref(), text, &context) {
            Ok(Some(best)) => best,
            Ok(None) => return None,
            Err(e) => {
                warn!("⚠️  Domain corpus search failed: {:#}", e);
                return None;
            }
        };

        let threshold = domain.profile().similarity_threshold;
        if score > threshold {
            info!("📚 Corpus answer {:.3} > {:.2}: {}", score, threshold, entry.question);
            Some(Decision::Csv {
                answer: entry.answer.clone(),
                similarity: score,
                matched_question: entry.question.clone(),
            })
        } else {
            debug!("Best corpus score {:.3} not above {:.2}", score, threshold);
            None
        }
    }
}
