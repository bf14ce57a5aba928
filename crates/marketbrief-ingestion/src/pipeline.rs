//! Run-for-date orchestrator.
//!
//! For every report discovered on a date the pipeline walks
//!
//! ```text
//! DISCOVERED → [skip|DOWNLOADED] → [skip|EXTRACTED] → [skip|SUMMARIZED] → EMBEDDED_AND_STORED
//! ```
//!
//! A stage is skipped when its artifact already exists under the data
//! directory, so an interrupted run resumes where it stopped. Download and
//! extraction failures abort the report, a summary failure only degrades it,
//! and an embedding or storage failure marks the report failed without
//! touching the reports before it. Only a discovery failure aborts the date.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use marketbrief_common::{ConfigError, DateRange};
use marketbrief_db::{ChunkRecord, ChunkStore, StoreOutcome};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::Archiver;
use crate::chunker::{chunk_words, ChunkFilter, ChunkerConfig};
use crate::embedding::{embed_chunks, EmbeddingService};
use crate::error::{ExtractionError, Stage, StageError};
use crate::extract::TextExtractor;
use crate::fetch::DocumentFetcher;
use crate::models::Report;
use crate::paths::{write_artifact, ArtifactLayout, ArtifactPaths, ArtifactStage};
use crate::sources::ReportSource;
use crate::summarizer::SummarizationService;

// ── Wiring ────────────────────────────────────────────────────────────────────

/// Every external collaborator of the pipeline.
#[derive(Clone)]
pub struct PipelineServices {
    pub source: Arc<dyn ReportSource>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub extractor: Arc<dyn TextExtractor>,
    pub summarizer: Arc<dyn SummarizationService>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub store: Arc<dyn ChunkStore>,
    /// `None` disables archiving.
    pub archiver: Option<Arc<dyn Archiver>>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_dir: PathBuf,
    pub chunker: ChunkerConfig,
    pub filter: ChunkFilter,
    pub batch_size: usize,
    /// Skip the embed stage for documents that already carry a marker.
    pub embed_marker: bool,
    /// Run the embed stage even when a marker exists.
    pub reembed: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            chunker: ChunkerConfig::default(),
            filter: ChunkFilter::default(),
            batch_size: 32,
            embed_marker: true,
            reembed: false,
        }
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    Done,
    Skipped,
    Degraded(String),
    Failed(String),
}

/// What happened to one report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub document_id: String,
    pub company: String,
    pub title: String,
    pub stages: Vec<(Stage, StageStatus)>,
    pub chunks_stored: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub error: Option<String>,
}

impl ReportOutcome {
    fn new(report: &Report) -> Self {
        Self {
            document_id: report.document_id().to_string(),
            company: report.company.clone(),
            title: report.title.clone(),
            stages: Vec::new(),
            chunks_stored: 0,
            duplicates: 0,
            rejected: 0,
            error: None,
        }
    }

    fn record(&mut self, stage: Stage, status: StageStatus) {
        self.stages.push((stage, status));
    }

    fn fail(mut self, stage: Stage, err: StageError) -> Self {
        warn!(stage = %stage, error = %err, "report aborted");
        let message = err.to_string();
        self.record(stage, StageStatus::Failed(message.clone()));
        self.error = Some(message);
        self
    }

    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, status)| status)
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.stages.iter().any(|(_, s)| matches!(s, StageStatus::Degraded(_)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DateSummary {
    pub date: NaiveDate,
    pub reports: Vec<ReportOutcome>,
    pub duration_ms: u64,
}

impl DateSummary {
    fn new(date: NaiveDate) -> Self {
        Self { date, reports: Vec::new(), duration_ms: 0 }
    }

    pub fn discovered(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failed()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.discovered() - self.failed()
    }

    pub fn chunks_stored(&self) -> usize {
        self.reports.iter().map(|r| r.chunks_stored).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.reports.iter().map(|r| r.duplicates).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryFailure {
    pub date: NaiveDate,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub dates: Vec<DateSummary>,
    pub discovery_failures: Vec<DiscoveryFailure>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn reports(&self) -> usize {
        self.dates.iter().map(DateSummary::discovered).sum()
    }

    pub fn failed_reports(&self) -> usize {
        self.dates.iter().map(DateSummary::failed).sum()
    }

    pub fn chunks_stored(&self) -> usize {
        self.dates.iter().map(DateSummary::chunks_stored).sum()
    }

    pub fn has_discovery_failures(&self) -> bool {
        !self.discovery_failures.is_empty()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    services: PipelineServices,
    options: PipelineOptions,
    layout: ArtifactLayout,
}

impl Pipeline {
    pub fn new(services: PipelineServices, options: PipelineOptions) -> Result<Self, ConfigError> {
        options.chunker.validate()?;
        let layout = ArtifactLayout::new(&options.data_dir);
        Ok(Self { services, options, layout })
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Warm up the model-backed services.
    pub async fn init(&self) -> Result<(), StageError> {
        self.services.embedder.init().await?;
        self.services.summarizer.init().await?;
        info!(
            model = self.services.embedder.model_id(),
            dim = self.services.embedder.dimension(),
            "pipeline services ready"
        );
        Ok(())
    }

    /// Release model-backed services. Both are shut down even if the first fails.
    pub async fn shutdown(&self) -> Result<(), StageError> {
        let embedder = self.services.embedder.shutdown().await;
        let summarizer = self.services.summarizer.shutdown().await;
        embedder?;
        summarizer?;
        Ok(())
    }

    /// Dates strictly in order. A date whose discovery fails is recorded and
    /// the run moves on to the next one.
    pub async fn run_range(&self, range: DateRange) -> RunSummary {
        let t0 = Instant::now();
        let mut run = RunSummary::default();
        for date in range.iter() {
            match self.run_for_date(date).await {
                Ok(summary) => run.dates.push(summary),
                Err(e) => {
                    error!(date = %date, stage = %e.stage(), error = %e, "date aborted");
                    run.discovery_failures.push(DiscoveryFailure { date, error: e.to_string() });
                }
            }
        }
        run.duration_ms = t0.elapsed().as_millis() as u64;
        info!(
            dates = range.len(),
            reports = run.reports(),
            failed = run.failed_reports(),
            chunks = run.chunks_stored(),
            discovery_failures = run.discovery_failures.len(),
            duration_ms = run.duration_ms,
            "run complete"
        );
        run
    }

    #[instrument(skip_all, fields(date = %date))]
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<DateSummary, StageError> {
        let t0 = Instant::now();
        let reports = self.services.source.list_reports(date).await?;
        info!(stage = %Stage::Discover, reports = reports.len(), "reports discovered");

        let mut summary = DateSummary::new(date);
        for report in &reports {
            summary.reports.push(self.process_report(report, date).await);
        }
        summary.duration_ms = t0.elapsed().as_millis() as u64;

        info!(
            discovered = summary.discovered(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            chunks = summary.chunks_stored(),
            duplicates = summary.duplicates(),
            duration_ms = summary.duration_ms,
            "date complete"
        );
        Ok(summary)
    }

    /// Drive one report through every stage. Never returns an error: the
    /// outcome records where and why the report stopped.
    #[instrument(
        skip(self, report),
        fields(company = %report.company, title = %report.title, document_id = %report.document_id())
    )]
    pub async fn process_report(&self, report: &Report, date: NaiveDate) -> ReportOutcome {
        let mut outcome = ReportOutcome::new(report);
        let paths = self.layout.resolve(&report.document_id(), date);

        let pdf = match self.download(report, date, &paths).await {
            Ok((status, pdf)) => {
                outcome.record(Stage::Download, status);
                pdf
            }
            Err(e) => return outcome.fail(Stage::Download, e),
        };

        let text = match self.extract(date, &paths, pdf).await {
            Ok((status, text)) => {
                outcome.record(Stage::Extract, status);
                text
            }
            Err(e) => return outcome.fail(Stage::Extract, e),
        };

        match self.summarize(date, &paths, &text).await {
            Ok(status) => outcome.record(Stage::Summarize, status),
            Err(e) => {
                warn!(stage = %Stage::Summarize, error = %e, "summary unavailable, continuing");
                outcome.record(Stage::Summarize, StageStatus::Degraded(e.to_string()));
            }
        }

        match self.embed_and_store(report, &paths, &text, &mut outcome).await {
            Ok(status) => outcome.record(Stage::Embed, status),
            Err(e) => return outcome.fail(e.stage(), e),
        }

        info!(
            chunks = outcome.chunks_stored,
            duplicates = outcome.duplicates,
            rejected = outcome.rejected,
            "report processed"
        );
        outcome
    }

    // ── Stages ────────────────────────────────────────────────────────────────

    /// Returns the fresh PDF bytes, or `None` when the raw artifact was reused.
    async fn download(
        &self,
        report: &Report,
        date: NaiveDate,
        paths: &ArtifactPaths,
    ) -> Result<(StageStatus, Option<Vec<u8>>), StageError> {
        if paths.raw.exists() {
            debug!(stage = %Stage::Download, path = %paths.raw.display(), "raw artifact present, skipping");
            return Ok((StageStatus::Skipped, None));
        }

        let bytes = self.services.fetcher.fetch(&report.document_url).await?;
        info!(
            stage = %Stage::Download,
            size_mb = bytes.len() as f64 / (1024.0 * 1024.0),
            "PDF downloaded"
        );
        self.persist(ArtifactStage::Raw, date, &paths.raw, &bytes).await?;
        Ok((StageStatus::Done, Some(bytes)))
    }

    async fn extract(
        &self,
        date: NaiveDate,
        paths: &ArtifactPaths,
        pdf: Option<Vec<u8>>,
    ) -> Result<(StageStatus, String), StageError> {
        if paths.text.exists() {
            debug!(stage = %Stage::Extract, "text artifact present, skipping");
            let text = tokio::fs::read_to_string(&paths.text)
                .await
                .map_err(|e| StageError::artifact(&paths.text, e))?;
            return Ok((StageStatus::Skipped, text));
        }

        let pdf = match pdf {
            Some(bytes) => bytes,
            None => tokio::fs::read(&paths.raw)
                .await
                .map_err(|e| StageError::artifact(&paths.raw, e))?,
        };
        let text = self.services.extractor.extract_text(&pdf).await?;
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyText.into());
        }
        info!(
            stage = %Stage::Extract,
            extractor = self.services.extractor.name(),
            chars = text.chars().count(),
            "text extracted"
        );
        self.persist(ArtifactStage::Text, date, &paths.text, text.as_bytes()).await?;
        Ok((StageStatus::Done, text))
    }

    async fn summarize(
        &self,
        date: NaiveDate,
        paths: &ArtifactPaths,
        text: &str,
    ) -> Result<StageStatus, StageError> {
        if paths.summary.exists() {
            debug!(stage = %Stage::Summarize, "summary artifact present, skipping");
            return Ok(StageStatus::Skipped);
        }

        let summary = self.services.summarizer.summarize(text).await?;
        self.persist(ArtifactStage::Summary, date, &paths.summary, summary.as_bytes()).await?;
        info!(stage = %Stage::Summarize, chars = summary.chars().count(), "summary written");
        Ok(StageStatus::Done)
    }

    async fn embed_and_store(
        &self,
        report: &Report,
        paths: &ArtifactPaths,
        text: &str,
        outcome: &mut ReportOutcome,
    ) -> Result<StageStatus, StageError> {
        let use_marker = self.options.embed_marker && !self.options.reembed;
        if use_marker && paths.embedded_marker.exists() {
            debug!(stage = %Stage::Embed, "embed marker present, skipping");
            return Ok(StageStatus::Skipped);
        }

        let cfg = self.options.chunker;
        let windows = chunk_words(text, cfg.chunk_size, cfg.overlap)?;
        let total = windows.len();
        let (kept, rejected) = self.options.filter.select(windows);
        outcome.rejected = rejected;
        debug!(stage = %Stage::Embed, windows = total, kept = kept.len(), rejected, "chunks selected");

        if !kept.is_empty() {
            let texts: Vec<String> = kept.iter().map(|w| w.text.clone()).collect();
            let embedded =
                embed_chunks(self.services.embedder.as_ref(), &texts, self.options.batch_size).await?;

            let document_id = report.document_id();
            let records: Vec<ChunkRecord> = kept
                .iter()
                .zip(embedded)
                .map(|(window, chunk)| {
                    ChunkRecord::new(document_id.as_str(), window.index, chunk.text, chunk.embedding)
                        .with_metadata(report.chunk_metadata(window.token_start))
                })
                .collect();

            let outcomes = self.services.store.store_document(&records).await?;
            outcome.chunks_stored = outcomes.iter().filter(|o| o.is_inserted()).count();
            outcome.duplicates = outcomes
                .iter()
                .filter(|o| matches!(o, StoreOutcome::DuplicateSkipped))
                .count();
            info!(
                stage = %Stage::Store,
                chunks = outcome.chunks_stored,
                duplicates = outcome.duplicates,
                "chunks committed"
            );
        }

        if self.options.embed_marker {
            self.write_marker(&paths.embedded_marker, outcome);
        }
        Ok(StageStatus::Done)
    }

    // ── Artifacts ─────────────────────────────────────────────────────────────

    async fn persist(
        &self,
        stage: ArtifactStage,
        date: NaiveDate,
        path: &Path,
        bytes: &[u8],
    ) -> Result<(), StageError> {
        write_artifact(path, bytes).map_err(|e| StageError::artifact(path, e))?;
        self.archive(stage, date, path).await;
        Ok(())
    }

    /// Upload failures never change the report outcome.
    async fn archive(&self, stage: ArtifactStage, date: NaiveDate, path: &Path) {
        let Some(archiver) = &self.services.archiver else {
            return;
        };
        let key = ArtifactLayout::remote_key(stage, date, path);
        match archiver.upload(path, &key).await {
            Ok(()) => debug!(stage = %Stage::Archive, key = %key, "artifact archived"),
            Err(e) => warn!(stage = %Stage::Archive, key = %key, error = %e, "artifact upload failed"),
        }
    }

    /// Written after the commit; a lost marker only costs a re-embed that the
    /// store answers with duplicates.
    fn write_marker(&self, path: &Path, outcome: &ReportOutcome) {
        let marker = serde_json::json!({
            "document_id": outcome.document_id,
            "model": self.services.embedder.model_id(),
            "chunks": outcome.chunks_stored + outcome.duplicates,
            "embedded_at": chrono::Utc::now().to_rfc3339(),
        });
        if let Err(e) = write_artifact(path, marker.to_string().as_bytes()) {
            warn!(stage = %Stage::Embed, path = %path.display(), error = %e, "embed marker not written");
        }
    }
}
