//! Stage error types.
//!
//! Each collaborator has its own error enum; [`StageError`] wraps them so the
//! orchestrator can decide per stage whether to abort the report or degrade.

use std::fmt;
use std::path::PathBuf;

use marketbrief_common::{ConfigError, SandboxError};
use marketbrief_db::DbError;
use marketbrief_llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("report feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("report feed returned HTTP {status}")]
    Status { status: u16 },
    #[error("report feed payload is malformed: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("download of {0} returned an empty body")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDF parse failed: {0}")]
    Pdf(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("extraction service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("extraction service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
    #[error("extracted text is empty")]
    EmptyText,
    #[error("extraction task failed: {0}")]
    Task(String),
    #[error("all extractors failed; primary: {primary}; fallback: {fallback}")]
    Exhausted {
        primary: Box<ExtractionError>,
        fallback: Box<ExtractionError>,
    },
}

#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("summarizer not configured: {0}")]
    NotConfigured(String),
    #[error("summary request failed: {0}")]
    Llm(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload of {key} returned HTTP {status}")]
    Status { key: String, status: u16 },
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    InvalidBufferSize { expected: usize, actual: usize },
    #[error("embedding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, actual: usize },
    #[error("input {index} is too long: {tokens} tokens, limit {max}")]
    InputTooLong { index: usize, tokens: usize, max: usize },
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("embedding backend error: {0}")]
    Backend(String),
}

/// Stage of the per-report state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Download,
    Extract,
    Summarize,
    Embed,
    Store,
    Archive,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Summarize => "summarize",
            Stage::Embed => "embed",
            Stage::Store => "store",
            Stage::Archive => "archive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("summarization failed: {0}")]
    Summarization(#[from] SummarizationError),
    #[error("archive upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("chunk storage failed: {0}")]
    Storage(#[from] DbError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("artifact I/O failed for {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Artifact { path: path.into(), source }
    }

    /// Stage the error belongs to. Artifact I/O is attributed by the caller
    /// through the stage it was running, so it reports `Store` only when
    /// nothing better is known.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Discovery(_) => Stage::Discover,
            StageError::Fetch(_) => Stage::Download,
            StageError::Extraction(_) => Stage::Extract,
            StageError::Summarization(_) => Stage::Summarize,
            StageError::Upload(_) => Stage::Archive,
            StageError::Embedding(_) | StageError::Config(_) => Stage::Embed,
            StageError::Storage(_) | StageError::Artifact { .. } => Stage::Store,
        }
    }
}
