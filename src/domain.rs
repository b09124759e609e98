//! Named domain profiles and the loaded state of the current one.

use crate::config::{DomainProfile, KnowledgeSourceConfig};
use crate::error::ServiceError;
use crate::knowledge::{loader, normalize_key, KnowledgeSource};
use crate::models::KnowledgeEntry;
use crate::nlp::{self, Embedder};
use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    profiles: IndexMap<String, DomainProfile>,
}

impl DomainRegistry {
    pub fn new(profiles: Vec<DomainProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn profiles(&self) -> &IndexMap<String, DomainProfile> {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Result<&DomainProfile, ServiceError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ServiceError::UnknownDomain {
                name: name.to_string(),
                available: self.names(),
            })
    }
}

/// The current domain with its corpus and intent table loaded.
pub struct ActiveDomain {
    profile: DomainProfile,
    corpus: Option<KnowledgeSource>,
    intents: HashMap<String, String>,
}

impl ActiveDomain {
    /// Loads whatever the profile points at. Missing or unreadable files
    /// leave the domain without a corpus or intent table.
    pub fn load(profile: DomainProfile, embedder: &dyn Embedder) -> Self {
        let corpus = profile.csv_path.as_ref().and_then(|path| {
            let config = KnowledgeSourceConfig {
                name: profile.name.clone(),
                csv_path: Some(path.clone()),
                similarity_threshold: profile.similarity_threshold,
                max_results: 5,
                enabled: true,
            };
            match KnowledgeSource::load(config, embedder) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!("⚠️  Domain '{}' corpus unavailable: {:#}", profile.name, e);
                    None
                }
            }
        });

        let intents = match &profile.intent_lookup_csv {
            Some(path) => match loader::read_intent_table(path) {
                Ok(rows) => rows
                    .into_iter()
                    .map(|(text, intent)| (normalize_key(&text), intent))
                    .collect(),
                Err(e) => {
                    warn!("⚠️  Domain '{}' intent table unavailable: {:#}", profile.name, e);
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let domain = Self {
            profile,
            corpus,
            intents,
        };
        info!(
            "🗂️  Domain '{}' ready: {} questions, {} intents",
            domain.name(),
            domain.questions_loaded(),
            domain.intents_loaded()
        );
        domain
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    pub fn questions_loaded(&self) -> usize {
        self.corpus.as_ref().map_or(0, KnowledgeSource::len)
    }

    pub fn intents_loaded(&self) -> usize {
        self.intents.len()
    }

    pub fn lookup_intent(&self, text: &str) -> Option<&str> {
        self.intents.get(&normalize_key(text)).map(String::as_str)
    }

    /// Closest corpus entry for `query`, scored with and without the prior
    /// bot turns in `context`, and the score it reached.
    pub fn closest(&self, embedder: &dyn Embedder, query: &str, context: &[String]) -> Result<Option<(&KnowledgeEntry, f32)>> {
        let Some(corpus) = self.corpus.as_ref().filter(|c| !c.is_empty()) else {
            return Ok(None);
        };

        let query_vec = embedder.embed(query)?;
        if nlp::is_degenerate(&query_vec) {
            return Ok(None);
        }
        let context_vec = if context.is_empty() {
            None
        } else {
            Some(embedder.embed(&format!("{} {}", query, context.join(" ")))?)
        };

        let best = corpus.best_match(&query_vec, context_vec.as_deref());
        if let Some((idx, score)) = best {
            debug!(
                "Domain '{}' best match #{} scored {:.3} (threshold {:.2}, {} context turns)",
                self.name(),
                idx,
                score,
                self.profile.similarity_threshold,
                context.len()
            );
        }
        Ok(best.map(|(idx, score)| (&corpus.entries()[idx], score)))
    }
}

/// Summary returned after switching domains.
#[derive(Debug, Clone, Serialize)]
pub struct DomainChange {
    pub status: &'static str,
    pub domain: String,
    pub config: DomainProfile,
    pub questions_loaded: usize,
    pub intents_loaded: usize,
}

impl From<&ActiveDomain> for DomainChange {
    fn from(domain: &ActiveDomain) -> Self {
        Self {
            status: "domain_changed",
            domain: domain.name().to_string(),
            config: domain.profile().clone(),
            questions_loaded: domain.questions_loaded(),
            intents_loaded: domain.intents_loaded(),
        }
    }
}
