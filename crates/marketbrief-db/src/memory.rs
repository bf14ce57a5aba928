//! In-process `ChunkStore`, used for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chunks::{ChunkStore, StoreOutcome};
use crate::error::Result;
use crate::schema::ChunkRecord;

/// Same contract as [`crate::PgChunkStore`]: unique on
/// `(document_id, chunk_index)`, all-or-nothing per `store_document` call.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    rows: Mutex<BTreeMap<(String, usize), ChunkRecord>>,
    dim: Option<usize>,
    document_writes: AtomicUsize,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce a vector dimension like the Postgres store does.
    pub fn with_dimension(dim: usize) -> Self {
        Self {
            dim: Some(dim),
            ..Self::default()
        }
    }

    /// All records, ordered by key.
    pub fn records(&self) -> Vec<ChunkRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of `store_document` calls that reached the store.
    pub fn document_writes(&self) -> usize {
        self.document_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, usize), ChunkRecord>> {
        // A poisoned map is still consistent: every write is a single insert.
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, record: &ChunkRecord) -> Result<()> {
        match self.dim {
            Some(dim) => record.check_dimension(dim),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn store(&self, record: &ChunkRecord) -> Result<StoreOutcome> {
        self.check(record)?;
        let mut rows = self.lock();
        let key = (record.document_id.clone(), record.chunk_index);
        if rows.contains_key(&key) {
            return Ok(StoreOutcome::DuplicateSkipped);
        }
        rows.insert(key, record.clone());
        Ok(StoreOutcome::Inserted)
    }

    async fn store_document(&self, records: &[ChunkRecord]) -> Result<Vec<StoreOutcome>> {
        self.document_writes.fetch_add(1, Ordering::SeqCst);
        for record in records {
            self.check(record)?;
        }

        let mut rows = self.lock();
        let mut outcomes = Vec::with_capacity(records.len());
        let mut staged: BTreeMap<(String, usize), ChunkRecord> = BTreeMap::new();
        for record in records {
            let key = (record.document_id.clone(), record.chunk_index);
            if rows.contains_key(&key) || staged.contains_key(&key) {
                outcomes.push(StoreOutcome::DuplicateSkipped);
            } else {
                staged.insert(key, record.clone());
                outcomes.push(StoreOutcome::Inserted);
            }
        }
        rows.extend(staged);
        Ok(outcomes)
    }

    async fn count_for_document(&self, document_id: &str) -> Result<u64> {
        let rows = self.lock();
        Ok(rows.keys().filter(|(doc, _)| doc == document_id).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use pretty_assertions::assert_eq;

    fn record(doc: &str, idx: usize) -> ChunkRecord {
        ChunkRecord::new(doc, idx, format!("chunk {idx} of {doc}"), vec![0.5; 4])
    }

    #[tokio::test]
    async fn test_duplicate_is_skipped() {
        let store = MemoryChunkStore::new();
        assert_eq!(store.store(&record("doc", 0)).await.unwrap(), StoreOutcome::Inserted);
        assert_eq!(
            store.store(&record("doc", 0)).await.unwrap(),
            StoreOutcome::DuplicateSkipped
        );
        assert_eq!(store.count_for_document("doc").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_does_not_overwrite() {
        let store = MemoryChunkStore::new();
        store.store(&record("doc", 0)).await.unwrap();
        let mut changed = record("doc", 0);
        changed.content = "something else".to_string();
        store.store(&changed).await.unwrap();
        assert_eq!(store.records()[0].content, "chunk 0 of doc");
    }

    #[tokio::test]
    async fn test_store_document_mixes_outcomes() {
        let store = MemoryChunkStore::new();
        store.store(&record("doc", 1)).await.unwrap();
        let outcomes = store
            .store_document(&[record("doc", 0), record("doc", 1), record("doc", 2)])
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                StoreOutcome::Inserted,
                StoreOutcome::DuplicateSkipped,
                StoreOutcome::Inserted
            ]
        );
        assert_eq!(store.count_for_document("doc").await.unwrap(), 3);
        assert_eq!(store.count_for_document("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_document_is_all_or_nothing() {
        let store = MemoryChunkStore::with_dimension(4);
        let mut bad = record("doc", 1);
        bad.embedding = vec![0.0; 3];
        let err = store
            .store_document(&[record("doc", 0), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidEmbeddingDimension { expected: 4, actual: 3 }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_repeated_key_within_one_document() {
        let store = MemoryChunkStore::new();
        let outcomes = tokio_test::block_on(
            store.store_document(&[record("doc", 0), record("doc", 0)]),
        );
        let outcomes = tokio_test::assert_ok!(outcomes);
        assert_eq!(outcomes, vec![StoreOutcome::Inserted, StoreOutcome::DuplicateSkipped]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.document_writes(), 1);
    }
}
