//! Data models for the ingestion pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::paths::DocumentId;

/// A report listed by the discovery source for one publication date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub company: String,
    pub title: String,
    pub published: NaiveDate,
    pub document_url: String,
}

impl Report {
    pub fn new(
        company: impl Into<String>,
        title: impl Into<String>,
        published: NaiveDate,
        document_url: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            title: title.into(),
            published,
            document_url: document_url.into(),
        }
    }

    pub fn document_id(&self) -> DocumentId {
        DocumentId::new(&self.company, &self.title)
    }

    /// Metadata stored with one chunk of this report. `token_start` locates
    /// the chunk in the extracted text after filtering renumbers indices.
    pub fn chunk_metadata(&self, token_start: usize) -> serde_json::Value {
        serde_json::json!({
            "company": self.company,
            "title": self.title,
            "date": self.published.format(marketbrief_common::dates::DATE_FORMAT).to_string(),
            "token_start": token_start,
        })
    }
}
