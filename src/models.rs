use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Who authored a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored conversational turn. Immutable once written to the memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub id: String,
    pub text: String,
    pub session_id: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

/// A turn as handed back to callers of the history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub message: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl From<&Utterance> for HistoryMessage {
    fn from(utterance: &Utterance) -> Self {
        Self {
            message: utterance.text.clone(),
            role: utterance.role,
            timestamp: utterance.timestamp,
            similarity: None,
        }
    }
}

/// One question/answer pair of a knowledge corpus.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeEntry {
    pub question: String,
    pub answer: String,
    pub source_name: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// A named entity found in an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub text: String,
}

/// Collapses an entity list into the `label -> text` map used on the wire.
/// Later mentions of the same label win.
pub fn entity_map(entities: &[Entity]) -> BTreeMap<String, String> {
    entities
        .iter()
        .map(|e| (e.label.clone(), e.text.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStrategy {
    ExactMatch,
    SemanticSearch,
    IntentClassification,
    ContextAware,
    Hybrid,
}

impl AnalysisStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStrategy::ExactMatch => "exact_match",
            AnalysisStrategy::SemanticSearch => "semantic_search",
            AnalysisStrategy::IntentClassification => "intent_classification",
            AnalysisStrategy::ContextAware => "context_aware",
            AnalysisStrategy::Hybrid => "hybrid",
        }
    }
}

impl Default for AnalysisStrategy {
    fn default() -> Self {
        AnalysisStrategy::Hybrid
    }
}

impl fmt::Display for AnalysisStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact_match" => Ok(AnalysisStrategy::ExactMatch),
            "semantic_search" => Ok(AnalysisStrategy::SemanticSearch),
            "intent_classification" => Ok(AnalysisStrategy::IntentClassification),
            "context_aware" => Ok(AnalysisStrategy::ContextAware),
            "hybrid" => Ok(AnalysisStrategy::Hybrid),
            other => Err(anyhow::anyhow!("Unknown analysis strategy: {}", other)),
        }
    }
}

/// Best entry of one knowledge source for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub source: String,
    pub score: f32,
    pub question: String,
    pub answer: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentMethod {
    ExactLookup,
    ModelClassification,
    Disabled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f32,
    pub method: IntentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f32>>,
}

impl IntentResult {
    pub fn unknown(method: IntentMethod) -> Self {
        Self {
            intent: "unknown".to_string(),
            confidence: 0.0,
            method,
            probabilities: None,
        }
    }
}

/// Strategy-specific payload of a generic analysis. The `source` tag names
/// the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Analysis {
    ExactMatch {
        #[serde(skip_serializing_if = "Option::is_none")]
        data_source: Option<String>,
        #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
        matched: Option<String>,
        confidence: f32,
    },
    SemanticSearch {
        #[serde(skip_serializing_if = "Option::is_none")]
        data_source: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        similarity: f32,
        all_results: Vec<SearchHit>,
    },
    IntentClassification {
        intent: String,
        confidence: f32,
        method: IntentMethod,
    },
    ContextAware {
        entities: BTreeMap<String, String>,
        context_used: Option<String>,
        relevant_history: Vec<HistoryMessage>,
    },
}

impl Analysis {
    /// Confidence or similarity the hybrid chain compares against its
    /// thresholds. Context-aware analysis carries no score.
    pub fn score(&self) -> f32 {
        match self {
            Analysis::ExactMatch { confidence, .. } => *confidence,
            Analysis::SemanticSearch { similarity, .. } => *similarity,
            Analysis::IntentClassification { confidence, .. } => *confidence,
            Analysis::ContextAware { .. } => 0.0,
        }
    }

    pub fn strategy(&self) -> AnalysisStrategy {
        match self {
            Analysis::ExactMatch { .. } => AnalysisStrategy::ExactMatch,
            Analysis::SemanticSearch { .. } => AnalysisStrategy::SemanticSearch,
            Analysis::IntentClassification { .. } => AnalysisStrategy::IntentClassification,
            Analysis::ContextAware { .. } => AnalysisStrategy::ContextAware,
        }
    }
}

/// Envelope returned by the strategy-selectable orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub original_text: String,
    pub resolved_text: String,
    pub rewritten: Option<String>,
    pub session_id: Option<String>,
    pub strategy_used: AnalysisStrategy,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub analysis: Analysis,
}

/// Branch taken by the domain-driven request path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source")]
pub enum Decision {
    #[serde(rename = "csv_lookup")]
    CsvLookup {
        intent: String,
        matched_question: String,
    },
    #[serde(rename = "csv")]
    Csv {
        answer: String,
        similarity: f32,
        matched_question: String,
    },
    #[serde(rename = "llm")]
    Llm {
        intent: String,
        method: IntentMethod,
        confidence: f32,
        domain_threshold: f32,
        entities: BTreeMap<String, String>,
        context_used: Option<String>,
        relevant_history: Vec<HistoryMessage>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionResponse {
    #[serde(flatten)]
    pub decision: Decision,
    pub original_text: String,
    pub resolved_text: String,
    pub rewritten: Option<String>,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
}
