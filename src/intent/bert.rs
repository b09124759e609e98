use anyhow::{anyhow, Context, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::{Tokenizer, TruncationParams};

use super::IntentModel;
use crate::nlp::embeddings::hidden_size;

const MAX_TOKENS: usize = 64;

/// Fine-tuned BERT sequence classifier loaded from a local directory holding
/// `config.json`, `tokenizer.json`, `model.safetensors` and `id2intent.json`.
pub struct BertIntentModel {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    device: Device,
}

impl BertIntentModel {
    pub fn load(dir: &Path) -> Result<Self> {
        let device = Device::Cpu;

        let raw_config = std::fs::read_to_string(dir.join("config.json"))
            .with_context(|| format!("No config.json in {}", dir.display()))?;
        let config: Config = serde_json::from_str(&raw_config)?;
        let hidden_size = hidden_size(&raw_config)?;

        let labels = read_labels(&dir.join("id2intent.json"))?;
        if labels.is_empty() {
            return Err(anyhow!("id2intent.json defines no intents"));
        }

        let mut tokenizer = Tokenizer::from_file(dir.join("tokenizer.json")).map_err(|e| anyhow!(e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!(e))?;

        let weights = dir.join("model.safetensors");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DTYPE, &device)? };
        let model = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = candle_nn::linear(hidden_size, hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden_size, labels.len(), vb.pp("classifier"))?;

        Ok(Self {
            model,
            pooler,
            classifier,
            tokenizer,
            labels,
            device,
        })
    }
}

/// `{"0": "greeting", "1": "leave_request"}` into an index-ordered label list.
/// Gaps in the numbering become "unknown".
fn read_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let map: HashMap<String, String> = serde_json::from_str(&raw)?;

    // Ids past twice the label count cannot come from a real head.
    let max_id = map.len() * 2;
    let mut indexed = Vec::with_capacity(map.len());
    for (key, label) in map {
        let idx: usize = key
            .parse()
            .with_context(|| format!("Non-numeric intent id '{}'", key))?;
        if idx >= max_id {
            return Err(anyhow!("Intent id {} is out of range for {} labels", idx, max_id / 2));
        }
        indexed.push((idx, label));
    }

    let len = indexed.iter().map(|(idx, _)| idx + 1).max().unwrap_or(0);
    let mut labels = vec!["unknown".to_string(); len];
    for (idx, label) in indexed {
        labels[idx] = label;
    }
    Ok(labels)
}

impl IntentModel for BertIntentModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = self.tokenizer.encode(text, true).map_err(|e| anyhow!(e))?;
        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self.model.forward(&token_ids, &token_type_ids, None)?;
        // [CLS] token through the pooler, then the classification head.
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        let probabilities = candle_nn::ops::softmax(&logits, 1)?;

        Ok(probabilities.squeeze(0)?.to_vec1::<f32>()?)
    }
}
