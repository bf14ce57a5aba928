//! Report summaries via an LLM backend.
//!
//! A failed summary never stops a report: the orchestrator records the stage
//! as degraded and moves on to embedding.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use marketbrief_llm::{LlmBackend, LlmCallRecord, LlmRequest, Message};
use tracing::instrument;

use crate::error::SummarizationError;

/// Analyst prompt: five sections covering market situation, core strategy,
/// sentiment, trends/keywords and the key insight of the report.
pub const SYSTEM_PROMPT: &str = "\
당신은 증권사 리포트를 분석하는 전문가입니다.

아래는 리포트 본문입니다. 이 내용을 바탕으로 다음 항목을 명확하고 간결하게 정리해 주세요:

1.  **시장 상황 분석**: 현재 거시 경제, 특정 업종, 수급 상황은 어떠한가?
2.  **핵심 투자 전략**: 이러한 상황에서 어떤 투자 전략 또는 대응이 필요한가?
3.  **투자 심리**: 리포트에서 드러나는 전반적인 투자 심리는 어떠한가? (예: 낙관적, 보수적, 불안 등)
4.  **주요 트렌드/키워드**: 주목해야 할 국가, 산업, 기술, 테마는 무엇인가?
5.  **핵심 인사이트**: 이 리포트가 제공하는 가장 중요한 관찰이나 독창적인 인사이트는 무엇인가?
";

#[async_trait]
pub trait SummarizationService: Send + Sync {
    async fn init(&self) -> Result<(), SummarizationError> {
        Ok(())
    }

    async fn summarize(&self, text: &str) -> Result<String, SummarizationError>;

    async fn shutdown(&self) -> Result<(), SummarizationError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Report text beyond this many characters is not sent.
    pub max_input_chars: usize,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.5,
            max_input_chars: 60_000,
        }
    }
}

pub struct LlmSummarizer {
    backend: Arc<dyn LlmBackend>,
    options: SummarizerOptions,
}

impl LlmSummarizer {
    pub fn new(backend: Arc<dyn LlmBackend>, options: SummarizerOptions) -> Self {
        Self { backend, options }
    }

    fn request(&self, text: &str) -> LlmRequest {
        let body: String = text.chars().take(self.options.max_input_chars).collect();
        LlmRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(body)],
            model: None,
            max_tokens: Some(self.options.max_tokens),
            temperature: Some(self.options.temperature),
        }
    }
}

#[async_trait]
impl SummarizationService for LlmSummarizer {
    #[instrument(skip(self, text), fields(model = self.backend.model_id(), chars = text.chars().count()))]
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError> {
        let started = Instant::now();
        let response = self.backend.complete(self.request(text)).await?;
        LlmCallRecord::new(self.backend.name(), &response, started.elapsed().as_millis() as u64).log();
        Ok(response.content)
    }
}

/// Used when no LLM credentials are configured.
#[derive(Debug, Clone)]
pub struct DisabledSummarizer {
    reason: String,
}

impl DisabledSummarizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl SummarizationService for DisabledSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String, SummarizationError> {
        Err(SummarizationError::NotConfigured(self.reason.clone()))
    }
}
