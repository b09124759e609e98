//! Black-box NLP capabilities: sentence embeddings, similarity, entity
//! extraction and neural coreference. The rest of the crate talks to these
//! traits only.

pub mod embeddings;
pub mod entities;
pub mod hashing;

use crate::config::{EmbedderKind, EntityConfig, NlpConfig};
use crate::models::Entity;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub use embeddings::BertEmbedder;
pub use entities::PatternEntityExtractor;
pub use hashing::HashingEmbedder;

pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub trait EntityExtractor: Send + Sync {
    fn entities(&self, text: &str) -> Vec<Entity>;
}

/// Rewrites referring expressions in a speaker-tagged context window.
pub trait CoreferenceModel: Send + Sync {
    fn resolve(&self, context: &str) -> Result<String>;
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// True for vectors that must never be stored or trusted for ranking.
pub fn is_degenerate(v: &[f32]) -> bool {
    let norm = l2_norm(v);
    v.is_empty() || norm == 0.0 || !norm.is_finite()
}

/// Cosine similarity clamped to [0, 1]. Mismatched or zero vectors score 0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

/// The bundle of NLP capabilities one service instance runs on.
#[derive(Clone)]
pub struct NlpBackend {
    pub embedder: Arc<dyn Embedder>,
    pub entities: Arc<dyn EntityExtractor>,
    pub coreference: Option<Arc<dyn CoreferenceModel>>,
}

impl NlpBackend {
    /// Builds the configured backend. Failing to build the embedder is fatal:
    /// the service cannot rank anything without it.
    pub fn from_config(nlp: &NlpConfig, entities: &EntityConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = match nlp.embedder {
            EmbedderKind::Bert => {
                let cache_dir = match &nlp.cache_dir {
                    Some(dir) => dir.clone(),
                    None => crate::utils::paths::get_model_cache_dir()?,
                };
                Arc::new(BertEmbedder::new(&nlp.model_id, cache_dir)?)
            }
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(nlp.hashing_dimensions)),
        };
        info!("Embedder ready: {} ({} dims)", embedder.name(), embedder.dimensions());

        Ok(Self {
            embedder,
            entities: Arc::new(PatternEntityExtractor::from_config(entities)),
            coreference: None,
        })
    }

    /// Offline backend used by tests and air-gapped deployments.
    pub fn hashing(dimensions: usize) -> Self {
        Self {
            embedder: Arc::new(HashingEmbedder::new(dimensions)),
            entities: Arc::new(PatternEntityExtractor::default()),
            coreference: None,
        }
    }

    pub fn with_coreference(mut self, model: Arc<dyn CoreferenceModel>) -> Self {
        self.coreference = Some(model);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_fully_similar() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        assert_eq!(similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn zero_and_mismatched_vectors_score_zero() {
        assert_eq!(similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn degenerate_detection() {
        assert!(is_degenerate(&[]));
        assert!(is_degenerate(&[0.0; 8]));
        assert!(is_degenerate(&[f32::NAN, 1.0]));
        assert!(!is_degenerate(&[0.0, 1.0]));
    }
}
