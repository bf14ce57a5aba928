//! MarketBrief local embeddings
//!
//! Sentence embeddings from an e5 family BERT model (`intfloat/e5-base-v2` by
//! default) using Candle. Inputs are embedded as passages (`"passage: "`
//! prefix), mean pooled over real tokens and L2 normalised, so cosine
//! similarity is a dot product.
//!
//! # Example
//! ```rust,no_run
//! use marketbrief_embed::{E5Embedder, EmbeddingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let embedder = E5Embedder::new(EmbeddingConfig::cpu()).await?;
//!     let texts = vec!["반도체 업황 회복 기대".to_string()];
//!     let embeddings = embedder.embed(&texts)?;
//!     assert_eq!(embeddings[0].len(), embedder.dimension());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embedder;
pub mod error;
pub mod pooling;

pub use config::EmbeddingConfig;
pub use embedder::E5Embedder;
pub use error::{EmbedError, Result};
pub use pooling::PoolingStrategy;
