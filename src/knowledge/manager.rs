use crate::config::KnowledgeSourceConfig;
use crate::models::{KnowledgeEntry, SearchHit};
use crate::nlp::{self, Embedder};
use anyhow::Result;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::KnowledgeSource;

/// Registry of knowledge sources in registration order.
#[derive(Default, Clone)]
pub struct DataSourceManager {
    sources: IndexMap<String, Arc<KnowledgeSource>>,
}

impl DataSourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every configured source. Sources that fail to load are logged
    /// and left out.
    pub fn from_configs(configs: &[KnowledgeSourceConfig], embedder: &dyn Embedder) -> Self {
        let mut manager = Self::new();
        for config in configs {
            manager.add_source(config.clone(), embedder);
        }
        manager
    }

    /// Returns whether the source was registered.
    pub fn add_source(&mut self, config: KnowledgeSourceConfig, embedder: &dyn Embedder) -> bool {
        if !config.enabled {
            debug!("Data source '{}' is disabled, skipping", config.name);
            return false;
        }
        if config.csv_path.is_none() {
            debug!("Data source '{}' has no corpus, skipping", config.name);
            return false;
        }

        let name = config.name.clone();
        match KnowledgeSource::load(config, embedder) {
            Ok(source) => {
                self.insert(source);
                true
            }
            Err(e) => {
                warn!("⚠️  Failed to load data source '{}': {:#}", name, e);
                false
            }
        }
    }

    pub fn insert(&mut self, source: KnowledgeSource) {
        self.sources
            .insert(source.name().to_string(), Arc::new(source));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn total_entries(&self) -> usize {
        self.sources.values().map(|s| s.len()).sum()
    }

    fn enabled(&self) -> impl Iterator<Item = &Arc<KnowledgeSource>> {
        self.sources.values().filter(|s| s.config().enabled)
    }

    /// First normalized hit across enabled sources, in registration order.
    pub fn exact_match(&self, text: &str) -> Option<&KnowledgeEntry> {
        self.enabled().find_map(|source| source.exact(text))
    }

    /// Best entry per enabled source at or above that source's threshold,
    /// ranked by score. Ties keep registration order.
    ///
    /// `context` holds prior bot turns; when present each entry also scores
    /// against `query + " " + context` and keeps the better of the two.
    pub fn search(&self, embedder: &dyn Embedder, query: &str, context: &[String]) -> Result<Vec<SearchHit>> {
        if self.sources.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embedder.embed(query)?;
        if nlp::is_degenerate(&query_vec) {
            debug!("Query embedding is degenerate, nothing to rank");
            return Ok(Vec::new());
        }

        let context_vec = if context.is_empty() {
            None
        } else {
            let combined = format!("{} {}", query, context.join(" "));
            Some(embedder.embed(&combined)?)
        };

        let mut hits = Vec::new();
        for source in self.enabled() {
            let Some((index, score)) = source.best_match(&query_vec, context_vec.as_deref()) else {
                continue;
            };
            if score >= source.config().similarity_threshold {
                let entry = &source.entries()[index];
                hits.push(SearchHit {
                    source: source.name().to_string(),
                    score,
                    question: entry.question.clone(),
                    answer: entry.answer.clone(),
                    index,
                });
            }
        }

        // Stable: equal scores stay in registration order.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if !hits.is_empty() {
            info!("🔎 {} source(s) matched, best '{}' ({:.3})", hits.len(), hits[0].source, hits[0].score);
        }
        Ok(hits)
    }
}
