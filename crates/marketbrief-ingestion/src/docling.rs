//! Docling service client, the high-accuracy extractor.
//!
//! Docling runs as a separate HTTP service (default `http://localhost:8003`)
//! and does layout analysis and OCR, which matters for scanned or
//! table-heavy broker reports.

use async_trait::async_trait;
use marketbrief_common::SandboxClient as Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::ExtractionError;
use crate::extract::TextExtractor;

pub const DOCLING_DEFAULT_URL: &str = "http://localhost:8003";

pub struct DoclingExtractor {
    base_url: String,
    client: Client,
}

/// The parts of Docling's `/parse` response we read.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedDocument {
    pub full_text: String,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentMetadata {
    pub page_count: Option<i32>,
    #[serde(default)]
    pub has_tables: bool,
}

impl DoclingExtractor {
    pub fn new(base_url: Option<&str>, mut client: Client) -> Self {
        let base_url = base_url.unwrap_or(DOCLING_DEFAULT_URL).trim_end_matches('/').to_string();
        client.allow_url(&base_url);
        Self { base_url, client }
    }

    /// Check if the Docling service is up.
    pub async fn health_check(&self) -> Result<bool, ExtractionError> {
        let resp = self.client.get(&format!("{}/health", self.base_url))?.send().await?;
        Ok(resp.status().is_success())
    }

    pub async fn parse_pdf(&self, pdf: &[u8]) -> Result<ParsedDocument, ExtractionError> {
        let part = reqwest::multipart::Part::bytes(pdf.to_vec())
            .file_name("report.pdf")
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(&format!("{}/parse", self.base_url))?
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::Service {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl TextExtractor for DoclingExtractor {
    fn name(&self) -> &'static str {
        "docling"
    }

    #[instrument(skip(self, pdf), fields(bytes = pdf.len()))]
    async fn extract_text(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        let doc = self.parse_pdf(pdf).await?;
        if let Some(meta) = &doc.metadata {
            debug!(pages = ?meta.page_count, tables = meta.has_tables, "docling parsed document");
        }
        Ok(doc.full_text)
    }
}
