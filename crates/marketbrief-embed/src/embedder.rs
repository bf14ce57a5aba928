//! e5 passage embedder on Candle's BERT.

use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::pooling::l2_normalize;
use crate::{EmbedError, EmbeddingConfig, Result};

/// Local embedding model.
///
/// Construction downloads (or reads) the model once; [`E5Embedder::embed`] is
/// synchronous and CPU/GPU bound, so async callers should run it on a
/// blocking thread.
pub struct E5Embedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
    config: EmbeddingConfig,
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl E5Embedder {
    pub async fn new(config: EmbeddingConfig) -> Result<Self> {
        let start = Instant::now();
        info!(model = %config.model_id, "loading embedding model");

        let device = select_device(&config);
        debug!("Using device: {:?}", device);

        let files = match &config.model_dir {
            Some(dir) => local_files(dir)?,
            None => hub_files(&config.model_id).await?,
        };

        let bert_config: Config = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        let hidden_size = bert_config.hidden_size;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)?;
        // Truncation and padding are applied per batch below.
        tokenizer.with_padding(None);
        tokenizer.with_truncation(None)?;

        let vb = if files.weights.extension().is_some_and(|e| e == "safetensors") {
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)? }
        } else {
            VarBuilder::from_pth(&files.weights, DType::F32, &device)?
        };
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;

        info!(
            dim = hidden_size,
            elapsed_s = %format!("{:.2}", start.elapsed().as_secs_f32()),
            "embedding model loaded"
        );

        Ok(Self { model, tokenizer, device, hidden_size, config })
    }

    /// Embed a batch of passages, one vector per input in input order.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let inputs: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", self.config.prefix, t))
            .collect();
        let encodings = self.tokenizer.encode_batch(inputs, true)?;

        let limit = self.config.max_length.max(2);
        let mut rows: Vec<Vec<u32>> = Vec::with_capacity(encodings.len());
        for (index, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            if ids.len() > limit {
                if !self.config.truncate {
                    return Err(EmbedError::InputTooLong { index, tokens: ids.len(), max: limit });
                }
                // Keep the closing special token.
                let mut cut = ids[..limit - 1].to_vec();
                cut.push(ids[ids.len() - 1]);
                rows.push(cut);
            } else {
                rows.push(ids.to_vec());
            }
        }

        let seq_len = rows.iter().map(Vec::len).max().unwrap_or(0);
        let batch = rows.len();
        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for row in &rows {
            ids.extend_from_slice(row);
            ids.extend(std::iter::repeat_n(0u32, seq_len - row.len()));
            mask.extend(std::iter::repeat_n(1f32, row.len()));
            mask.extend(std::iter::repeat_n(0f32, seq_len - row.len()));
        }

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = self.config.pooling.apply(&hidden, &attention_mask)?;
        let pooled = if self.config.normalize { l2_normalize(&pooled)? } else { pooled };
        let out = pooled.to_vec2::<f32>()?;

        debug!(
            n = texts.len(),
            seq_len,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "embedded batch"
        );
        Ok(out)
    }

    /// Hidden size of the loaded model (768 for e5-base-v2).
    pub fn dimension(&self) -> usize {
        self.hidden_size
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_id
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.device, Device::Cuda(_) | Device::Metal(_))
    }
}

fn select_device(config: &EmbeddingConfig) -> Device {
    if !config.use_gpu {
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => debug!("CUDA not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return device,
            Err(e) => debug!("Metal not available: {}, falling back to CPU", e),
        }
    }

    Device::Cpu
}

fn local_files(dir: &Path) -> Result<ModelFiles> {
    let pick = |names: &[&str]| -> Result<PathBuf> {
        names
            .iter()
            .map(|n| dir.join(n))
            .find(|p| p.is_file())
            .ok_or_else(|| EmbedError::ModelLoad(format!("{} not found in {}", names.join(" / "), dir.display())))
    };
    Ok(ModelFiles {
        config: pick(&["config.json"])?,
        tokenizer: pick(&["tokenizer.json"])?,
        weights: pick(&["model.safetensors", "pytorch_model.bin"])?,
    })
}

async fn hub_files(model_id: &str) -> Result<ModelFiles> {
    let api = hf_hub::api::tokio::Api::new()?;
    let repo = api.model(model_id.to_string());

    let config = repo.get("config.json").await?;
    let tokenizer = repo.get("tokenizer.json").await?;
    let weights = match repo.get("model.safetensors").await {
        Ok(path) => path,
        Err(_) => repo.get("pytorch_model.bin").await?,
    };
    debug!(weights = %weights.display(), "model files cached");
    Ok(ModelFiles { config, tokenizer, weights })
}
