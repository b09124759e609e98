use crate::config::{
    validate_sources, validate_threshold, Config, DomainProfile, IntentProfile, KnowledgeSourceConfig, SemanticConfig,
};
use crate::coref::CoreferenceResolver;
use crate::domain::{ActiveDomain, DomainChange, DomainRegistry};
use crate::error::ServiceError;
use crate::intent::IntentClassifier;
use crate::knowledge::DataSourceManager;
use crate::memory::VectorMemoryStore;
use crate::models::{entity_map, AnalysisStrategy, HistoryMessage, IntentMethod, Role};
use crate::nlp::NlpBackend;
use anyhow::Result;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{AnalyzeRequest, PreparedText};

/// Everything `configure` may replace. Readers take an `Arc` snapshot and
/// never observe a half-applied update.
pub struct Registry {
    pub data_sources: DataSourceManager,
    pub source_configs: Vec<KnowledgeSourceConfig>,
    pub intent_profile: Option<IntentProfile>,
    pub intent: Arc<IntentClassifier>,
    pub semantic: SemanticConfig,
    pub default_strategy: AnalysisStrategy,
}

pub struct NlpService {
    pub(super) backend: NlpBackend,
    pub(super) memory: VectorMemoryStore,
    pub(super) coref: CoreferenceResolver,
    registry: RwLock<Arc<Registry>>,
    domains: DomainRegistry,
    active: RwLock<Arc<ActiveDomain>>,
    // Serializes rebuilds; readers never wait on these.
    configure_lock: Mutex<()>,
    domain_lock: Mutex<()>,
}

impl std::fmt::Debug for NlpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NlpService")
            .field("embedder", &self.backend.embedder.name())
            .field("memory_records", &self.memory.len())
            .field("current_domain", &self.active.read().name())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigureRequest {
    #[serde(default)]
    pub data_sources: Option<Vec<KnowledgeSourceConfig>>,
    #[serde(default)]
    pub intent_config: Option<IntentProfile>,
    #[serde(default)]
    pub semantic_config: Option<SemanticConfig>,
    #[serde(default)]
    pub default_strategy: Option<AnalysisStrategy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigureSummary {
    pub status: &'static str,
    pub config: ConfigOverview,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigOverview {
    pub data_sources: usize,
    pub data_sources_loaded: usize,
    pub intent_enabled: bool,
    pub semantic_config: SemanticConfig,
    pub default_strategy: AnalysisStrategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainListing {
    pub current_domain: String,
    pub available_domains: Vec<String>,
    pub domain_configs: IndexMap<String, DomainProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub embedder: String,
    pub data_sources: usize,
    pub intent_enabled: bool,
    pub coreference_model: bool,
    pub memory_records: usize,
    pub current_domain: String,
}

/// Intent of a bare utterance and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentAnswer {
    pub intent: String,
    pub source: &'static str,
    pub confidence: f32,
    pub method: IntentMethod,
}

impl NlpService {
    pub fn new(config: &Config) -> Result<Self> {
        let backend = NlpBackend::from_config(&config.nlp, &config.entities)?;
        Self::with_backend(config, backend)
    }

    /// Builds the service on an already constructed backend. Corpora, the
    /// intent model and the domain files degrade individually; only an
    /// unreadable memory snapshot is fatal.
    pub fn with_backend(config: &Config, backend: NlpBackend) -> Result<Self> {
        info!("Initializing NLP service...");

        let memory = VectorMemoryStore::open(backend.embedder.clone(), config.memory_snapshot_path()?)?;
        let data_sources = DataSourceManager::from_configs(&config.data_sources, backend.embedder.as_ref());
        let intent = IntentClassifier::from_profile(config.intent.as_ref());
        let coref = CoreferenceResolver::new(config.coreference.clone(), backend.coreference.clone());

        let domains = DomainRegistry::new(config.domains.clone());
        let profile = domains.get(&config.current_domain)?.clone();
        let active = ActiveDomain::load(profile, backend.embedder.as_ref());

        info!(
            "Service ready - sources: {}, intent model: {}, domain: {}, memory: {}",
            data_sources.len(),
            intent.is_ready(),
            active.name(),
            memory.len()
        );

        let registry = Registry {
            data_sources,
            source_configs: config.data_sources.clone(),
            intent_profile: config.intent.clone(),
            intent: Arc::new(intent),
            semantic: config.semantic.clone(),
            default_strategy: config.default_strategy,
        };

        Ok(Self {
            backend,
            memory,
            coref,
            registry: RwLock::new(Arc::new(registry)),
            domains,
            active: RwLock::new(Arc::new(active)),
            configure_lock: Mutex::new(()),
            domain_lock: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.read().clone()
    }

    pub fn active_domain(&self) -> Arc<ActiveDomain> {
        self.active.read().clone()
    }

    pub fn backend(&self) -> &NlpBackend {
        &self.backend
    }

    pub fn memory(&self) -> &VectorMemoryStore {
        &self.memory
    }

    /// Swaps in a prebuilt intent classifier, keeping everything else.
    pub fn install_intent_classifier(&self, classifier: IntentClassifier) {
        let _guard = self.configure_lock.lock();
        let current = self.registry();
        let next = Registry {
            data_sources: current.data_sources.clone(),
            source_configs: current.source_configs.clone(),
            intent_profile: current.intent_profile.clone(),
            intent: Arc::new(classifier),
            semantic: current.semantic.clone(),
            default_strategy: current.default_strategy,
        };
        *self.registry.write() = Arc::new(next);
    }

    /// Persists the user turn (best effort) and resolves coreference.
    pub(super) fn prepare(&self, request: &AnalyzeRequest, semantic: &SemanticConfig) -> PreparedText {
        if let Some(session_id) = &request.session_id {
            if let Err(e) = self.memory.store(session_id, &request.text, Role::User, None) {
                warn!("⚠️  Failed to store user turn for session {}: {:#}", session_id, e);
            }
        }

        let resolved = if semantic.use_coreference {
            self.coref.resolve(
                &request.text,
                request.prev_bot_response.as_deref(),
                request.last_user_message.as_deref(),
            )
        } else {
            request.text.clone()
        };

        let rewritten = if resolved != request.text {
            info!("🔁 Rewrote '{}' to '{}' using context", request.text, resolved);
            Some(resolved.clone())
        } else {
            None
        };

        PreparedText {
            original: request.text.clone(),
            resolved,
            rewritten,
        }
    }

    pub fn store_message(
        &self,
        session_id: &str,
        text: &str,
        role: Role,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        self.memory.store(session_id, text, role, timestamp)
    }

    pub fn relevant_history(&self, query: &str, session_id: Option<&str>, top_k: usize) -> Result<Vec<HistoryMessage>> {
        self.memory.relevant(query, session_id, top_k)
    }

    pub fn session_history(&self, session_id: &str, limit: usize) -> Vec<HistoryMessage> {
        self.memory.session_history(session_id, limit)
    }

    /// The current domain's lookup table first, then the intent classifier.
    pub fn classify_intent(&self, text: &str) -> IntentAnswer {
        if let Some(intent) = self.active_domain().lookup_intent(text) {
            return IntentAnswer {
                intent: intent.to_string(),
                source: "csv_lookup",
                confidence: 1.0,
                method: IntentMethod::ExactLookup,
            };
        }

        let result = self.registry().intent.classify(text);
        IntentAnswer {
            intent: result.intent,
            source: "model",
            confidence: result.confidence,
            method: result.method,
        }
    }

    pub fn extract_entities(&self, text: &str) -> BTreeMap<String, String> {
        entity_map(&self.backend.entities.entities(text))
    }

    /// Resolves `text` against the caller's last bot turn and the most recent
    /// user turn of the session.
    pub fn resolve_coref(&self, text: &str, session_id: Option<&str>, prev_bot: Option<&str>) -> String {
        let last_user = session_id.and_then(|session| {
            self.memory
                .session_history(session, 2)
                .into_iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.message)
        });
        self.coref.resolve(text, prev_bot, last_user.as_deref())
    }

    /// Applies a partial reconfiguration. Omitted sections keep their
    /// current value; data sources are replaced wholesale when given.
    pub fn configure(&self, request: ConfigureRequest) -> Result<ConfigureSummary, ServiceError> {
        if let Some(sources) = &request.data_sources {
            validate_sources(sources)?;
        }
        if let Some(profile) = &request.intent_config {
            validate_threshold("intent.confidence_threshold", profile.confidence_threshold)?;
        }
        if let Some(semantic) = &request.semantic_config {
            validate_threshold("semantic.similarity_threshold", semantic.similarity_threshold)?;
        }

        let _guard = self.configure_lock.lock();
        let current = self.registry();

        let (data_sources, source_configs) = match request.data_sources {
            Some(configs) => {
                info!("🔧 Reloading {} data source(s)", configs.len());
                let manager = DataSourceManager::from_configs(&configs, self.backend.embedder.as_ref());
                (manager, configs)
            }
            None => (current.data_sources.clone(), current.source_configs.clone()),
        };

        let (intent, intent_profile) = match request.intent_config {
            Some(profile) => {
                let classifier = IntentClassifier::from_profile(Some(&profile));
                (Arc::new(classifier), Some(profile))
            }
            None => (current.intent.clone(), current.intent_profile.clone()),
        };

        let next = Registry {
            data_sources,
            source_configs,
            intent_profile,
            intent,
            semantic: request.semantic_config.unwrap_or_else(|| current.semantic.clone()),
            default_strategy: request.default_strategy.unwrap_or(current.default_strategy),
        };

        let summary = ConfigureSummary {
            status: "configured",
            config: ConfigOverview {
                data_sources: next.source_configs.len(),
                data_sources_loaded: next.data_sources.len(),
                intent_enabled: next.intent.is_ready(),
                semantic_config: next.semantic.clone(),
                default_strategy: next.default_strategy,
            },
        };

        *self.registry.write() = Arc::new(next);
        debug!("Registry swapped");
        Ok(summary)
    }

    pub fn change_domain(&self, name: &str) -> Result<DomainChange, ServiceError> {
        let profile = self.domains.get(name)?.clone();

        let _guard = self.domain_lock.lock();
        let domain = ActiveDomain::load(profile, self.backend.embedder.as_ref());
        let change = DomainChange::from(&domain);
        *self.active.write() = Arc::new(domain);

        info!("🗂️  Switched to domain '{}'", name);
        Ok(change)
    }

    pub fn domains(&self) -> DomainListing {
        DomainListing {
            current_domain: self.active_domain().name().to_string(),
            available_domains: self.domains.names(),
            domain_configs: self.domains.profiles().clone(),
        }
    }

    pub fn health(&self) -> HealthReport {
        let registry = self.registry();
        HealthReport {
            status: "healthy",
            embedder: self.backend.embedder.name().to_string(),
            data_sources: registry.data_sources.len(),
            intent_enabled: registry.intent.is_ready(),
            coreference_model: self.coref.has_model(),
            memory_records: self.memory.len(),
            current_domain: self.active_domain().name().to_string(),
        }
    }
}
