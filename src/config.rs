use crate::error::ServiceError;
use crate::models::AnalysisStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub nlp: NlpConfig,
    pub memory: MemoryConfig,
    pub data_sources: Vec<KnowledgeSourceConfig>,
    pub intent: Option<IntentProfile>,
    pub semantic: SemanticConfig,
    pub default_strategy: AnalysisStrategy,
    pub coreference: CorefConfig,
    pub entities: EntityConfig,
    pub domains: Vec<DomainProfile>,
    pub current_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub request_timeout_secs: u64,
    /// Runtime worker threads; defaults to the number of CPUs.
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Bert,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpConfig {
    pub embedder: EmbedderKind,
    pub model_id: String,
    pub cache_dir: Option<PathBuf>,
    pub hashing_dimensions: usize,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderKind::Bert,
            model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            cache_dir: None,
            hashing_dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub persist: bool,
    /// Snapshot file; defaults to `memory.json` in the data directory.
    pub path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persist: true,
            path: None,
        }
    }
}

/// One named question/answer corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSourceConfig {
    pub name: String,
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
    #[serde(default = "default_source_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentProfile {
    pub model_path: PathBuf,
    #[serde(default)]
    pub lookup_csv_path: Option<PathBuf>,
    #[serde(default = "default_intent_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub similarity_threshold: f32,
    pub max_history_results: usize,
    pub use_coreference: bool,
    pub enabled: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            max_history_results: 5,
            use_coreference: true,
            enabled: true,
        }
    }
}

/// Keyword table driving the rule-based coreference rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorefConfig {
    pub markers: Vec<String>,
    pub follow_up_phrases: Vec<String>,
    pub pronouns: Vec<String>,
    pub rules: Vec<CorefRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorefRule {
    pub topic_keywords: Vec<String>,
    pub restatement: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRule {
    pub keyword: String,
    pub restatement: String,
}

impl Default for CorefConfig {
    fn default() -> Self {
        let words = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            markers: words(&["it", "this", "that", "they", "them", "those", "what about"]),
            follow_up_phrases: words(&["what about"]),
            pronouns: words(&["it", "this", "that"]),
            rules: vec![
                CorefRule {
                    topic_keywords: words(&["leave", "policy"]),
                    restatement: "what is the leave policy for".to_string(),
                    subject: Some("the leave policy".to_string()),
                    roles: vec![
                        RoleRule {
                            keyword: "manager".to_string(),
                            restatement: "what is the leave policy for managers".to_string(),
                        },
                        RoleRule {
                            keyword: "employee".to_string(),
                            restatement: "what is the leave policy for employees".to_string(),
                        },
                    ],
                },
                CorefRule {
                    topic_keywords: words(&["technical", "support"]),
                    restatement: "what is the technical support for".to_string(),
                    subject: Some("technical support".to_string()),
                    roles: vec![RoleRule {
                        keyword: "manager".to_string(),
                        restatement: "what is the technical support for managers".to_string(),
                    }],
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub patterns: Vec<EntityPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPattern {
    pub label: String,
    pub pattern: String,
}

impl Default for EntityConfig {
    fn default() -> Self {
        let pattern = |label: &str, pattern: &str| EntityPattern {
            label: label.to_string(),
            pattern: pattern.to_string(),
        };
        // Order matters: earlier patterns claim their spans first.
        Self {
            patterns: vec![
                pattern("EMAIL", r"[\w.+-]+@[\w-]+\.[\w.-]+"),
                pattern("MONEY", r"\$\s?\d+(?:,\d{3})*(?:\.\d+)?"),
                pattern("PERCENT", r"\b\d+(?:\.\d+)?\s?%"),
                pattern(
                    "DATE",
                    r"(?i)\b\d{4}-\d{2}-\d{2}\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.? \d{1,2}(?:, \d{4})?\b|\b(?:today|tomorrow|yesterday|next week|last week|next month|this month)\b",
                ),
                pattern("TIME", r"(?i)\b\d{1,2}:\d{2}\s?(?:am|pm)?\b"),
                pattern("CARDINAL", r"\b\d+\b"),
            ],
        }
    }
}

/// A named bundle of corpus, intent lookup table and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub name: String,
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
    #[serde(default)]
    pub intent_lookup_csv: Option<PathBuf>,
    pub similarity_threshold: f32,
    pub intent_confidence_threshold: f32,
}

fn default_source_threshold() -> f32 {
    0.7
}

fn default_max_results() -> usize {
    5
}

fn default_intent_threshold() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self> {
        // Try to load from config file, otherwise use defaults
        let config_path = std::env::current_dir()?.join("config.toml");

        if config_path.exists() {
            return Self::from_file(&config_path);
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("PARLEY_BIND") {
            self.server.bind = bind;
        }
        if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
            self.memory.path = Some(PathBuf::from(dir).join("memory.json"));
        }
        if let Ok(domain) = std::env::var("PARLEY_DOMAIN") {
            self.current_domain = domain;
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_sources(&self.data_sources)?;
        if let Some(intent) = &self.intent {
            validate_threshold("intent.confidence_threshold", intent.confidence_threshold)?;
        }
        validate_threshold("semantic.similarity_threshold", self.semantic.similarity_threshold)?;

        let mut names = HashSet::new();
        for domain in &self.domains {
            if !names.insert(domain.name.as_str()) {
                return Err(ServiceError::InvalidConfig(format!(
                    "duplicate domain '{}'",
                    domain.name
                )));
            }
            validate_threshold("domain.similarity_threshold", domain.similarity_threshold)?;
            validate_threshold(
                "domain.intent_confidence_threshold",
                domain.intent_confidence_threshold,
            )?;
        }
        if !names.contains(self.current_domain.as_str()) {
            return Err(ServiceError::InvalidConfig(format!(
                "current_domain '{}' is not a configured domain",
                self.current_domain
            )));
        }
        Ok(())
    }

    /// Where the memory snapshot lives, if persistence is on.
    pub fn memory_snapshot_path(&self) -> Result<Option<PathBuf>> {
        if !self.memory.persist {
            return Ok(None);
        }
        match &self.memory.path {
            Some(path) => Ok(Some(path.clone())),
            None => Ok(Some(crate::utils::paths::get_data_dir()?.join("memory.json"))),
        }
    }
}

pub fn validate_threshold(name: &str, value: f32) -> Result<(), ServiceError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ServiceError::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

pub fn validate_sources(sources: &[KnowledgeSourceConfig]) -> Result<(), ServiceError> {
    let mut names = HashSet::new();
    for source in sources {
        if !names.insert(source.name.as_str()) {
            return Err(ServiceError::InvalidConfig(format!(
                "duplicate data source '{}'",
                source.name
            )));
        }
        validate_threshold("data_source.similarity_threshold", source.similarity_threshold)?;
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            nlp: NlpConfig::default(),
            memory: MemoryConfig::default(),
            data_sources: vec![KnowledgeSourceConfig {
                name: "erp_knowledge".to_string(),
                csv_path: Some(PathBuf::from("data/erp_case_data.csv")),
                similarity_threshold: 0.75,
                max_results: 5,
                enabled: true,
            }],
            intent: Some(IntentProfile {
                model_path: PathBuf::from("intent_model"),
                lookup_csv_path: Some(PathBuf::from("data/erp_intents.csv")),
                confidence_threshold: 0.5,
                enabled: true,
            }),
            semantic: SemanticConfig::default(),
            default_strategy: AnalysisStrategy::Hybrid,
            coreference: CorefConfig::default(),
            entities: EntityConfig::default(),
            domains: vec![
                DomainProfile {
                    name: "erp".to_string(),
                    csv_path: Some(PathBuf::from("data/erp_case_data.csv")),
                    intent_lookup_csv: Some(PathBuf::from("data/erp_intents.csv")),
                    similarity_threshold: 0.75,
                    intent_confidence_threshold: 0.5,
                },
                DomainProfile {
                    name: "customer_service".to_string(),
                    csv_path: None,
                    intent_lookup_csv: None,
                    similarity_threshold: 0.7,
                    intent_confidence_threshold: 0.6,
                },
                DomainProfile {
                    name: "technical_support".to_string(),
                    csv_path: None,
                    intent_lookup_csv: None,
                    similarity_threshold: 0.8,
                    intent_confidence_threshold: 0.7,
                },
            ],
            current_domain: "erp".to_string(),
        }
    }
}
