//! In-process PDF text extraction with lopdf, the fast extractor.
//!
//! Reads the text operators page by page. No layout analysis or OCR, so
//! scanned pages come back empty.

use async_trait::async_trait;
use lopdf::Document as PdfDoc;
use tracing::{debug, instrument};

use crate::error::ExtractionError;
use crate::extract::TextExtractor;

/// Extract text from all pages of an in-memory PDF.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pdf = PdfDoc::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    let pages: Vec<u32> = pdf.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(ExtractionError::Pdf("document has no pages".into()));
    }

    let mut text = String::new();
    let mut failed = 0usize;
    for page in &pages {
        match pdf.extract_text(&[*page]) {
            Ok(page_text) => {
                text.push_str(page_text.trim_end());
                text.push('\n');
            }
            Err(e) => {
                failed += 1;
                debug!(page, error = %e, "page text extraction failed");
            }
        }
    }
    if failed == pages.len() {
        return Err(ExtractionError::Pdf("no page could be decoded".into()));
    }
    debug!(pages = pages.len(), failed, chars = text.chars().count(), "lopdf extracted text");
    Ok(text)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

#[async_trait]
impl TextExtractor for LopdfExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    #[instrument(skip(self, pdf), fields(bytes = pdf.len()))]
    async fn extract_text(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        let bytes = pdf.to_vec();
        tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?
    }
}
