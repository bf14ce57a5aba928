//! marketbrief-ingestion: daily report ETL.
//!
//! - Report discovery (ETFCheck feed)
//! - PDF download and text extraction (Docling with lopdf fallback)
//! - LLM summaries
//! - Word-window chunking with a validity filter
//! - Embedding and idempotent storage
//! - Artifact archiving
//!
//! [`pipeline::Pipeline`] ties the stages together; every collaborator sits
//! behind a trait so tests and dry runs can swap it out.

pub mod archive;
pub mod chunker;
pub mod docling;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod paths;
pub mod pdf_parser;
pub mod pipeline;
pub mod sources;
pub mod summarizer;

pub use error::{Stage, StageError};
pub use models::Report;
pub use pipeline::{
    DateSummary, DiscoveryFailure, Pipeline, PipelineOptions, PipelineServices, ReportOutcome,
    RunSummary, StageStatus,
};
