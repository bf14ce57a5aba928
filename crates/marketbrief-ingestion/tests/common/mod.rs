//! Stub collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use marketbrief_db::{ChunkRecord, ChunkStore, DbError, MemoryChunkStore, StoreOutcome};
use marketbrief_ingestion::archive::Archiver;
use marketbrief_ingestion::embedding::EmbeddingService;
use marketbrief_ingestion::error::{
    DiscoveryError, EmbeddingError, ExtractionError, FetchError, SummarizationError, UploadError,
};
use marketbrief_ingestion::extract::TextExtractor;
use marketbrief_ingestion::fetch::DocumentFetcher;
use marketbrief_ingestion::sources::ReportSource;
use marketbrief_ingestion::summarizer::SummarizationService;
use marketbrief_ingestion::{Pipeline, PipelineOptions, PipelineServices, Report};
use tempfile::TempDir;

pub const DIM: usize = 8;

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// `n` distinct words that pass the chunk filter.
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("market{i}")).collect::<Vec<_>>().join(" ")
}

pub fn report(company: &str, title: &str, date: NaiveDate) -> Report {
    Report::new(company, title, date, format!("https://reports.test/{company}/{title}.pdf"))
}

// ── Discovery ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubSource {
    pub reports: HashMap<NaiveDate, Vec<Report>>,
    pub failing: HashSet<NaiveDate>,
    pub calls: AtomicUsize,
}

impl StubSource {
    pub fn with(date: NaiveDate, reports: Vec<Report>) -> Self {
        let mut source = Self::default();
        source.reports.insert(date, reports);
        source
    }
}

#[async_trait]
impl ReportSource for StubSource {
    async fn list_reports(&self, date: NaiveDate) -> Result<Vec<Report>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&date) {
            return Err(DiscoveryError::Status { status: 503 });
        }
        Ok(self.reports.get(&date).cloned().unwrap_or_default())
    }
}

// ── Download and extraction ──────────────────────────────────────────────────

/// Returns the URL as the "PDF" body so the extractor can look it up.
#[derive(Default)]
pub struct StubFetcher {
    pub failing: HashSet<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl DocumentFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(url) {
            return Err(FetchError::Status { url: url.to_string(), status: 404 });
        }
        Ok(url.as_bytes().to_vec())
    }
}

pub struct StubExtractor {
    pub texts: HashMap<String, String>,
    pub default_text: String,
    pub calls: AtomicUsize,
}

impl StubExtractor {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self { texts: HashMap::new(), default_text: default_text.into(), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl TextExtractor for StubExtractor {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn extract_text(&self, pdf: &[u8]) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = String::from_utf8_lossy(pdf).into_owned();
        Ok(self.texts.get(&url).cloned().unwrap_or_else(|| self.default_text.clone()))
    }
}

// ── Summaries ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubSummarizer {
    pub fail: bool,
    pub calls: AtomicUsize,
    pub inits: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

#[async_trait]
impl SummarizationService for StubSummarizer {
    async fn init(&self) -> Result<(), SummarizationError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn summarize(&self, text: &str) -> Result<String, SummarizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SummarizationError::NotConfigured("no API key".into()));
        }
        Ok(format!("## 시장 상황\n{} words", text.split_whitespace().count()))
    }

    async fn shutdown(&self) -> Result<(), SummarizationError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Embeddings ────────────────────────────────────────────────────────────────

/// Deterministic vectors; fails every batch containing `poison`.
#[derive(Default)]
pub struct StubEmbedder {
    pub poison: Option<String>,
    pub calls: AtomicUsize,
    pub inits: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

#[async_trait]
impl EmbeddingService for StubEmbedder {
    fn model_id(&self) -> &str {
        "stub-embedder"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn init(&self) -> Result<(), EmbeddingError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(poison) = &self.poison {
            if texts.iter().any(|t| t.contains(poison.as_str())) {
                return Err(EmbeddingError::Backend("model crashed".into()));
            }
        }
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; DIM];
                v[0] = t.len() as f32;
                v[1] = 1.0;
                v
            })
            .collect())
    }

    async fn shutdown(&self) -> Result<(), EmbeddingError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// Delegates to a memory store but rejects whole documents by id.
pub struct FailingStore {
    pub inner: Arc<MemoryChunkStore>,
    pub failing: HashSet<String>,
}

impl FailingStore {
    pub fn new<'a>(inner: Arc<MemoryChunkStore>, failing: impl IntoIterator<Item = &'a str>) -> Self {
        Self { inner, failing: failing.into_iter().map(str::to_string).collect() }
    }

    fn check(&self, document_id: &str) -> marketbrief_db::Result<()> {
        if self.failing.contains(document_id) {
            return Err(DbError::InvalidIdentifier(document_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for FailingStore {
    async fn store(&self, record: &ChunkRecord) -> marketbrief_db::Result<StoreOutcome> {
        self.check(&record.document_id)?;
        self.inner.store(record).await
    }

    async fn store_document(
        &self,
        records: &[ChunkRecord],
    ) -> marketbrief_db::Result<Vec<StoreOutcome>> {
        if let Some(first) = records.first() {
            self.check(&first.document_id)?;
        }
        self.inner.store_document(records).await
    }

    async fn count_for_document(&self, document_id: &str) -> marketbrief_db::Result<u64> {
        self.inner.count_for_document(document_id).await
    }
}

// ── Archive ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingArchiver {
    pub fail: bool,
    pub keys: Mutex<Vec<String>>,
}

impl RecordingArchiver {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn upload(&self, local: &Path, key: &str) -> Result<(), UploadError> {
        assert!(local.exists(), "archived file must exist: {}", local.display());
        self.keys.lock().unwrap().push(key.to_string());
        if self.fail {
            return Err(UploadError::Status { key: key.to_string(), status: 500 });
        }
        Ok(())
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub dir: TempDir,
    pub source: Arc<StubSource>,
    pub fetcher: Arc<StubFetcher>,
    pub extractor: Arc<StubExtractor>,
    pub summarizer: Arc<StubSummarizer>,
    pub embedder: Arc<StubEmbedder>,
    pub store: Arc<MemoryChunkStore>,
    pub archiver: Arc<RecordingArchiver>,
}

impl Harness {
    pub fn new(source: StubSource, extractor: StubExtractor) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            source: Arc::new(source),
            fetcher: Arc::new(StubFetcher::default()),
            extractor: Arc::new(extractor),
            summarizer: Arc::new(StubSummarizer::default()),
            embedder: Arc::new(StubEmbedder::default()),
            store: Arc::new(MemoryChunkStore::with_dimension(DIM)),
            archiver: Arc::new(RecordingArchiver::default()),
        }
    }

    pub fn with_fetcher(mut self, fetcher: StubFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_summarizer(mut self, summarizer: StubSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    pub fn with_embedder(mut self, embedder: StubEmbedder) -> Self {
        self.embedder = Arc::new(embedder);
        self
    }

    pub fn with_archiver(mut self, archiver: RecordingArchiver) -> Self {
        self.archiver = Arc::new(archiver);
        self
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            data_dir: self.dir.path().to_path_buf(),
            ..PipelineOptions::default()
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(self.options())
    }

    pub fn services(&self) -> PipelineServices {
        PipelineServices {
            source: self.source.clone(),
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            summarizer: self.summarizer.clone(),
            embedder: self.embedder.clone(),
            store: self.store.clone(),
            archiver: Some(self.archiver.clone()),
        }
    }

    pub fn pipeline_with(&self, options: PipelineOptions) -> Pipeline {
        Pipeline::new(self.services(), options).unwrap()
    }

    pub fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }
}
