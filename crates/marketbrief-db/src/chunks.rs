//! Idempotent chunk writer.
//!
//! `store` and `store_document` never overwrite: a record whose
//! `(document_id, chunk_index)` already exists is reported as
//! [`StoreOutcome::DuplicateSkipped`] and left untouched.

use async_trait::async_trait;
use pgvector::Vector;
use tokio::sync::Mutex;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, GenericClient};

use crate::database;
use crate::error::{DbError, Result};
use crate::schema::{self, ChunkRecord, TableName};

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    DuplicateSkipped,
}

impl StoreOutcome {
    pub fn is_inserted(self) -> bool {
        matches!(self, StoreOutcome::Inserted)
    }
}

/// Persistence contract for chunk records.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert one record unless its key already exists.
    async fn store(&self, record: &ChunkRecord) -> Result<StoreOutcome>;

    /// Insert all records of one document atomically. On error nothing from
    /// this call is visible.
    async fn store_document(&self, records: &[ChunkRecord]) -> Result<Vec<StoreOutcome>>;

    /// Number of stored chunks for a document.
    async fn count_for_document(&self, document_id: &str) -> Result<u64>;
}

/// `ChunkStore` over PostgreSQL + pgvector.
pub struct PgChunkStore {
    client: Mutex<Client>,
    table: TableName,
    dim: usize,
}

impl PgChunkStore {
    pub fn new(client: Client, table: TableName, dim: usize) -> Self {
        Self {
            client: Mutex::new(client),
            table,
            dim,
        }
    }

    /// Connect and wrap in one step.
    pub async fn connect(url: &str, table: TableName, dim: usize) -> Result<Self> {
        let client = database::connect(url).await?;
        Ok(Self::new(client, table, dim))
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Create the `vector` extension and the chunk table when missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.client.lock().await;
        database::ensure_vector_extension(&client).await?;
        client
            .execute(&schema::create_table_sql(&self.table, self.dim), &[])
            .await?;
        tracing::info!(table = %self.table.qualified(), dim = self.dim, "chunk table ready");
        Ok(())
    }

    fn validate(&self, records: &[ChunkRecord]) -> Result<()> {
        for record in records {
            record.check_dimension(self.dim)?;
            i32::try_from(record.chunk_index)
                .map_err(|_| DbError::IndexOutOfRange(record.chunk_index))?;
        }
        Ok(())
    }
}

async fn insert_one<C: GenericClient>(
    client: &C,
    statement: &tokio_postgres::Statement,
    record: &ChunkRecord,
) -> Result<StoreOutcome> {
    let chunk_index = i32::try_from(record.chunk_index)
        .map_err(|_| DbError::IndexOutOfRange(record.chunk_index))?;
    let embedding = Vector::from(record.embedding.clone());
    let metadata = record.metadata.as_ref().map(Json);

    let row = client
        .query_opt(
            statement,
            &[
                &record.document_id,
                &chunk_index,
                &record.content,
                &embedding,
                &metadata,
            ],
        )
        .await?;

    Ok(match row {
        Some(_) => StoreOutcome::Inserted,
        None => StoreOutcome::DuplicateSkipped,
    })
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn store(&self, record: &ChunkRecord) -> Result<StoreOutcome> {
        self.validate(std::slice::from_ref(record))?;
        let client = self.client.lock().await;
        let statement = client.prepare(&schema::insert_sql(&self.table)).await?;
        insert_one(&*client, &statement, record).await
    }

    async fn store_document(&self, records: &[ChunkRecord]) -> Result<Vec<StoreOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.validate(records)?;

        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;
        let statement = transaction.prepare(&schema::insert_sql(&self.table)).await?;

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            // Dropping the transaction on error rolls it back.
            outcomes.push(insert_one(&transaction, &statement, record).await?);
        }
        transaction.commit().await?;

        let inserted = outcomes.iter().filter(|o| o.is_inserted()).count();
        tracing::debug!(
            document_id = %records[0].document_id,
            inserted,
            skipped = outcomes.len() - inserted,
            "chunks committed"
        );
        Ok(outcomes)
    }

    async fn count_for_document(&self, document_id: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE document_id = $1",
            self.table.qualified()
        );
        let client = self.client.lock().await;
        let row = client.query_one(&sql, &[&document_id]).await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}
