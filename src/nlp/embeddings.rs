use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use std::path::PathBuf;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use super::Embedder;

const MAX_TOKENS: usize = 256;

/// Sentence embedder over a BERT-family checkpoint from the Hugging Face hub
/// (all-MiniLM-L6-v2 by default). Mask-weighted mean pooling, L2-normalised.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimensions: usize,
}

impl BertEmbedder {
    pub fn new(model_id: &str, cache_dir: PathBuf) -> Result<Self> {
        let device = Device::Cpu;

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .build()
            .map_err(|e| anyhow!("Failed to init HF API: {}", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let fetch = |name: &str| repo.get(name).map_err(|e| anyhow!("Failed to fetch {} for {}: {}", name, model_id, e));
        let config_path = fetch("config.json")?;
        let tokenizer_path = fetch("tokenizer.json")?;
        let weights_path = fetch("model.safetensors")?;

        let raw_config = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&raw_config)?;
        let dimensions = hidden_size(&raw_config)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| anyhow!(e))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!(e))?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;
        info!("Loaded embedding model {} ({} dims)", model_id, dimensions);

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            dimensions,
        })
    }
}

/// `hidden_size` of a Hugging Face `config.json`.
pub(crate) fn hidden_size(raw_config: &str) -> Result<usize> {
    serde_json::from_str::<serde_json::Value>(raw_config)?
        .get("hidden_size")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("config.json has no hidden_size"))
}

/// Averages `hidden` (batch, tokens, hidden) over the tokens the mask keeps.
fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

impl Embedder for BertEmbedder {
    fn name(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| anyhow!(e))?;
        let token_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self.model.forward(&token_ids, &token_type_ids, Some(&mask))?;
        let pooled = mean_pool(&hidden, &mask)?.squeeze(0)?;

        // Zero norm is left as is for the degenerate-vector guard downstream.
        let norm = pooled.sqr()?.sum_all()?.sqrt()?;
        if norm.to_scalar::<f32>()? == 0.0 {
            return Ok(pooled.to_vec1()?);
        }
        Ok(pooled.broadcast_div(&norm)?.to_vec1()?)
    }
}
