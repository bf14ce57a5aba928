//! MarketBrief Database Layer
//!
//! Persists report chunks and their embeddings to PostgreSQL with the
//! pgvector extension. Writes are idempotent on `(document_id, chunk_index)`:
//! storing an existing key is a no-op reported as
//! [`StoreOutcome::DuplicateSkipped`].
//!
//! # Example
//!
//! ```rust,no_run
//! use marketbrief_db::{database, ChunkStore, PgChunkStore, TableName};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = database::connect("postgres://postgres@localhost/market_brief_ai").await?;
//!     let table = TableName::new("public", "report_chunks")?;
//!     let store = PgChunkStore::new(client, table, 768);
//!     store.ensure_schema().await?;
//!     println!("{} chunks", store.count_for_document("AcmeCo_Q3_Outlook").await?);
//!     Ok(())
//! }
//! ```

pub mod chunks;
pub mod database;
pub mod error;
pub mod memory;
pub mod schema;

pub use chunks::{ChunkStore, PgChunkStore, StoreOutcome};
pub use error::{DbError, Result};
pub use memory::MemoryChunkStore;
pub use schema::{ChunkRecord, TableName, DEFAULT_TABLE, EMBEDDING_DIM};
