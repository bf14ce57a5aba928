use chrono::NaiveDate;
use thiserror::Error;

/// Errors that abort a run before any report is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid chunking: overlap ({overlap}) must be smaller than chunk size ({chunk_size}) and chunk size must be positive")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("configuration error: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
