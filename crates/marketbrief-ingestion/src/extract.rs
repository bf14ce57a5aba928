//! Text extraction from downloaded PDFs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ExtractionError;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn extract_text(&self, pdf: &[u8]) -> Result<String, ExtractionError>;
}

/// Tries a high-accuracy extractor first and falls back to a fast one when it
/// fails or returns only whitespace.
pub struct FallbackExtractor {
    primary: Arc<dyn TextExtractor>,
    fallback: Arc<dyn TextExtractor>,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn TextExtractor>, fallback: Arc<dyn TextExtractor>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl TextExtractor for FallbackExtractor {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn extract_text(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        let primary_err = match self.primary.extract_text(pdf).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => ExtractionError::EmptyText,
            Err(e) => e,
        };
        warn!(
            primary = self.primary.name(),
            fallback = self.fallback.name(),
            error = %primary_err,
            "primary extractor failed, falling back"
        );
        match self.fallback.extract_text(pdf).await {
            Ok(text) => Ok(text),
            Err(fallback_err) => Err(ExtractionError::Exhausted {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<&'static str, &'static str>);

    #[async_trait]
    impl TextExtractor for Fixed {
        fn name(&self) -> &'static str { "fixed" }
        async fn extract_text(&self, _pdf: &[u8]) -> Result<String, ExtractionError> {
            self.0.map(str::to_string).map_err(|e| ExtractionError::Pdf(e.to_string()))
        }
    }

    fn chain(a: Result<&'static str, &'static str>, b: Result<&'static str, &'static str>) -> FallbackExtractor {
        FallbackExtractor::new(Arc::new(Fixed(a)), Arc::new(Fixed(b)))
    }

    #[tokio::test]
    async fn test_primary_wins() {
        assert_eq!(chain(Ok("hi-res"), Ok("fast")).extract_text(b"").await.unwrap(), "hi-res");
    }

    #[tokio::test]
    async fn test_falls_back_on_error_or_blank() {
        assert_eq!(chain(Err("down"), Ok("fast")).extract_text(b"").await.unwrap(), "fast");
        assert_eq!(chain(Ok("  \n"), Ok("fast")).extract_text(b"").await.unwrap(), "fast");
    }

    #[tokio::test]
    async fn test_both_fail() {
        let err = chain(Err("down"), Err("corrupt")).extract_text(b"").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Exhausted { .. }));
        assert!(err.to_string().contains("corrupt"));
    }
}
