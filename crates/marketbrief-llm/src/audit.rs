//! Per-call record of an LLM completion.
//!
//! The output itself is not logged, only its SHA-256, so a log line can be
//! matched against an archived summary without leaking report content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::LlmResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub model: String,
    pub backend: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: DateTime<Utc>,
}

impl LlmCallRecord {
    pub fn new(backend: &str, response: &LlmResponse, latency_ms: u64) -> Self {
        Self {
            model: response.model.clone(),
            backend: backend.to_string(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            output_hash: hash_output(&response.content),
            latency_ms,
            called_at: Utc::now(),
        }
    }

    /// Emit as a structured debug event.
    pub fn log(&self) {
        tracing::debug!(
            model = %self.model,
            backend = %self.backend,
            prompt_tokens = self.prompt_tokens,
            completion_tokens = self.completion_tokens,
            latency_ms = self.latency_ms,
            output_hash = %self.output_hash,
            "llm call"
        );
    }
}

/// Hex SHA-256 of the completion text.
pub fn hash_output(output: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(output.as_bytes());
    format!("{:x}", hasher.finalize())
}
