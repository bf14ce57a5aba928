//! Table layout for report chunks.
//!
//! One row per surviving chunk of a report. The natural key is
//! `(document_id, chunk_index)` and is enforced by a unique constraint, which
//! is what makes repeated runs idempotent.

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// e5-base-v2 outputs 768-dim vectors.
pub const EMBEDDING_DIM: usize = 768;

/// Default table name.
pub const DEFAULT_TABLE: &str = "report_chunks";

/// Default schema.
pub const DEFAULT_SCHEMA: &str = "public";

/// A chunk with its embedding, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Option<serde_json::Value>,
}

impl ChunkRecord {
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_index,
            content: content.into(),
            embedding,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Natural key of the record.
    pub fn key(&self) -> (&str, usize) {
        (&self.document_id, self.chunk_index)
    }

    pub(crate) fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.embedding.len() != expected {
            return Err(DbError::InvalidEmbeddingDimension {
                expected,
                actual: self.embedding.len(),
            });
        }
        Ok(())
    }
}

/// Schema-qualified table identifier. Both parts are quoted whenever they
/// appear in SQL text; values are always bound as parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();
        for part in [&schema, &table] {
            if part.trim().is_empty() || part.contains('\0') {
                return Err(DbError::InvalidIdentifier(format!("{schema:?}.{table:?}")));
            }
        }
        Ok(Self { schema, table })
    }

    /// Accepts `table` or `schema.table`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.split_once('.') {
            Some((schema, table)) => Self::new(schema, table),
            None => Self::new(DEFAULT_SCHEMA, name),
        }
    }

    /// `"schema"."table"` with embedded quotes escaped.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// Quotes a Postgres identifier, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

/// DDL for the chunk table.
pub fn create_table_sql(table: &TableName, dim: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding VECTOR({dim}) NOT NULL,
            metadata JSONB NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (document_id, chunk_index)
        )",
        table.qualified()
    )
}

/// Insert that reports a conflicting key as zero returned rows.
pub fn insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (document_id, chunk_index, content, embedding, metadata) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (document_id, chunk_index) DO NOTHING \
         RETURNING id",
        table.qualified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("report_chunks"), "\"report_chunks\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_parse_table_name() {
        let t = TableName::parse("report_chunks").unwrap();
        assert_eq!(t.qualified(), "\"public\".\"report_chunks\"");
        let t = TableName::parse("briefs.chunks").unwrap();
        assert_eq!(t.schema(), "briefs");
        assert_eq!(t.table(), "chunks");
        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("public. ").is_err());
    }

    #[test]
    fn test_table_name_cannot_break_out_of_quotes() {
        let t = TableName::new("public", "x\"; DROP TABLE y; --").unwrap();
        assert_eq!(t.qualified(), "\"public\".\"x\"\"; DROP TABLE y; --\"");
    }

    #[test]
    fn test_insert_sql_is_idempotent_insert() {
        let sql = insert_sql(&TableName::default());
        assert!(sql.contains("ON CONFLICT (document_id, chunk_index) DO NOTHING"));
        assert!(sql.contains("RETURNING id"));
        assert!(sql.contains("$5"));
    }

    #[test]
    fn test_create_table_sql_has_unique_key() {
        let sql = create_table_sql(&TableName::default(), 768);
        assert!(sql.contains("VECTOR(768)"));
        assert!(sql.contains("UNIQUE (document_id, chunk_index)"));
    }

    #[test]
    fn test_dimension_check() {
        let record = ChunkRecord::new("doc", 0, "text", vec![0.0; 3]);
        assert!(record.check_dimension(3).is_ok());
        assert!(matches!(
            record.check_dimension(768),
            Err(DbError::InvalidEmbeddingDimension { expected: 768, actual: 3 })
        ));
    }
}
