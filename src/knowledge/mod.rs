//! Question/answer corpora with precomputed embeddings.

pub mod loader;
pub mod manager;

use crate::config::KnowledgeSourceConfig;
use crate::models::KnowledgeEntry;
use crate::nlp::{self, Embedder};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tracing::info;

pub use manager::DataSourceManager;

/// Lookup key for exact matching: lowercase, punctuation dropped,
/// whitespace collapsed and trimmed.
pub fn normalize_key(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One named corpus. Entries and their embeddings never change after load.
pub struct KnowledgeSource {
    config: KnowledgeSourceConfig,
    entries: Vec<KnowledgeEntry>,
    exact: HashMap<String, usize>,
}

impl KnowledgeSource {
    /// Loads the corpus file named by the config and embeds every question.
    pub fn load(config: KnowledgeSourceConfig, embedder: &dyn Embedder) -> Result<Self> {
        let path = config
            .csv_path
            .clone()
            .ok_or_else(|| anyhow!("Data source '{}' has no corpus file", config.name))?;
        let pairs = loader::read_corpus(&path)?;
        let source = Self::from_pairs(config, pairs, embedder)?;
        info!(
            "📚 Loaded {} entries into source '{}' from {}",
            source.len(),
            source.name(),
            path.display()
        );
        Ok(source)
    }

    pub fn from_pairs(
        config: KnowledgeSourceConfig,
        pairs: Vec<(String, String)>,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(pairs.len());
        let mut exact = HashMap::with_capacity(pairs.len());

        for (question, answer) in pairs {
            let embedding = embedder.embed(&question)?;
            // Later duplicates of a question win the exact table.
            exact.insert(normalize_key(&question), entries.len());
            entries.push(KnowledgeEntry {
                question,
                answer,
                source_name: config.name.clone(),
                embedding,
            });
        }

        Ok(Self {
            config,
            entries,
            exact,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &KnowledgeSourceConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn exact(&self, text: &str) -> Option<&KnowledgeEntry> {
        self.exact
            .get(&normalize_key(text))
            .and_then(|idx| self.entries.get(*idx))
    }

    /// Index and score of the closest entry. With a context vector each entry
    /// scores the better of the plain and the context-enhanced similarity.
    /// Ties keep the earlier entry.
    pub fn best_match(&self, query: &[f32], context: Option<&[f32]>) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let mut score = nlp::similarity(query, &entry.embedding);
            if let Some(context) = context {
                score = score.max(nlp::similarity(context, &entry.embedding));
            }
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((idx, score));
            }
        }
        best
    }
}
