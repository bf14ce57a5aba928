//! Token-to-sentence pooling.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// How per-token hidden states become one vector per input.
///
/// e5 models are trained with mean pooling; `Cls` exists for BERT checkpoints
/// fine-tuned on the first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    #[default]
    Mean,
    Cls,
}

impl PoolingStrategy {
    /// `hidden`: (batch, seq, dim), `mask`: (batch, seq) as f32.
    /// Returns (batch, dim).
    pub fn apply(&self, hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            PoolingStrategy::Mean => mean_pool(hidden, mask),
            PoolingStrategy::Cls => hidden.narrow(1, 0, 1)?.squeeze(1),
        }
    }
}

/// Average of the hidden states of non-padding tokens.
fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
    summed.broadcast_div(&counts)
}

/// Row-wise L2 normalisation of a (batch, dim) tensor.
pub fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-9f32, f32::MAX)?;
    embeddings.broadcast_div(&norms)
}
