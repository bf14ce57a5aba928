//! Configuration for the local embedder.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::E5Embedder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Hugging Face model ID
    pub model_id: String,

    /// Load `config.json`, `tokenizer.json` and weights from this directory
    /// instead of the Hub.
    pub model_dir: Option<PathBuf>,

    /// Maximum sequence length in tokens, special tokens included
    pub max_length: usize,

    /// Cut longer inputs to `max_length`; when false they are rejected
    pub truncate: bool,

    /// Prepended to every input
    pub prefix: String,

    /// L2-normalize embeddings
    pub normalize: bool,

    pub pooling: super::PoolingStrategy,

    /// Use GPU if compiled in and available
    pub use_gpu: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "intfloat/e5-base-v2".to_string(),
            model_dir: None,
            max_length: 512,
            truncate: true,
            prefix: "passage: ".to_string(),
            normalize: true,
            pooling: super::PoolingStrategy::Mean,
            use_gpu: true,
        }
    }
}

impl EmbeddingConfig {
    /// CPU-only inference.
    pub fn cpu() -> Self {
        Self {
            use_gpu: false,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_length(mut self, length: usize) -> Self {
        self.max_length = length;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }
}
