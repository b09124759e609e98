#![allow(dead_code)]

use anyhow::Result;
use parley::config::{Config, DomainProfile, EmbedderKind, KnowledgeSourceConfig, MemoryConfig};
use parley::intent::{IntentClassifier, IntentModel};
use parley::nlp::CoreferenceModel;
use parley::{NlpBackend, NlpService};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CORPUS: &str = "Question,Answer
How do I reset my password?,Use the self-service portal.
What is the leave policy?,Employees accrue 20 days per year.
What is the leave policy for managers?,Managers accrue 25 days per year.
How do I submit an expense report?,Attach your receipts in Finance.
";

pub const INTENTS: &str = "text,intent
apply for leave,leave_request
";

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Offline configuration: hashing embedder, no snapshot, no intent model.
pub fn test_config(dir: &Path) -> Config {
    let corpus = write_file(dir, "corpus.csv", CORPUS);
    let intents = write_file(dir, "intents.csv", INTENTS);

    let mut config = Config::default();
    config.nlp.embedder = EmbedderKind::Hashing;
    config.nlp.hashing_dimensions = 256;
    config.memory = MemoryConfig {
        persist: false,
        path: None,
    };
    config.intent = None;
    config.data_sources = vec![KnowledgeSourceConfig {
        name: "erp_knowledge".to_string(),
        csv_path: Some(corpus.clone()),
        similarity_threshold: 0.5,
        max_results: 5,
        enabled: true,
    }];
    config.domains = vec![
        DomainProfile {
            name: "erp".to_string(),
            csv_path: Some(corpus),
            intent_lookup_csv: Some(intents),
            similarity_threshold: 0.75,
            intent_confidence_threshold: 0.5,
        },
        DomainProfile {
            name: "support".to_string(),
            csv_path: None,
            intent_lookup_csv: None,
            similarity_threshold: 0.8,
            intent_confidence_threshold: 0.7,
        },
    ];
    config.current_domain = "erp".to_string();
    config
}

pub fn service(dir: &Path) -> NlpService {
    NlpService::with_backend(&test_config(dir), NlpBackend::hashing(256)).unwrap()
}

/// Intent model that always answers with the same distribution.
pub struct FixedIntentModel {
    labels: Vec<String>,
    probabilities: Vec<f32>,
}

impl FixedIntentModel {
    pub fn new(labels: &[&str], probabilities: &[f32]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            probabilities: probabilities.to_vec(),
        }
    }
}

impl IntentModel for FixedIntentModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.probabilities.clone())
    }
}

pub fn confident_classifier(label: &str, confidence: f32) -> IntentClassifier {
    IntentClassifier::disabled().with_model(Arc::new(FixedIntentModel::new(
        &["other", label],
        &[1.0 - confidence, confidence],
    )))
}

/// Coreference model that answers every window with the same user turn.
pub struct FixedRewrite {
    output: String,
}

impl FixedRewrite {
    pub fn new(user_turn: &str) -> Self {
        Self {
            output: format!("Bot: (context)\nUser: {}", user_turn),
        }
    }
}

impl CoreferenceModel for FixedRewrite {
    fn resolve(&self, _context: &str) -> Result<String> {
        Ok(self.output.clone())
    }
}
