//! MarketBrief: daily analyst report ETL.
//! Entry point for the `marketbrief` binary.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use marketbrief_common::{parse_date, ConfigError, DateRange, SandboxClient};
use marketbrief_db::{ChunkStore, MemoryChunkStore, PgChunkStore, TableName};
use marketbrief_ingestion::archive::{Archiver, HttpObjectStore};
use marketbrief_ingestion::docling::DoclingExtractor;
use marketbrief_ingestion::embedding::{
    EmbeddingClient, EmbeddingService, RemoteBackend, RemoteEmbeddingConfig,
};
use marketbrief_ingestion::extract::{FallbackExtractor, TextExtractor};
use marketbrief_ingestion::fetch::HttpFetcher;
use marketbrief_ingestion::pdf_parser::LopdfExtractor;
use marketbrief_ingestion::sources::EtfCheckSource;
use marketbrief_ingestion::summarizer::{DisabledSummarizer, LlmSummarizer, SummarizationService};
use marketbrief_ingestion::{Pipeline, PipelineOptions, PipelineServices, RunSummary};
use marketbrief_llm::{build_backend, BackendKind, BackendSettings, LlmError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, EmbeddingBackend, SummarizerBackend};

#[derive(Parser, Debug)]
#[command(
    name = "marketbrief",
    version,
    about = "Discover, summarize and embed the day's analyst reports"
)]
struct Cli {
    /// Single publication date (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_date, conflicts_with_all = ["datefrom", "dateto"])]
    date: Option<NaiveDate>,

    /// First date of an inclusive range (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, requires = "dateto")]
    datefrom: Option<NaiveDate>,

    /// Last date of an inclusive range (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, requires = "datefrom")]
    dateto: Option<NaiveDate>,

    /// Path to marketbrief.toml
    #[arg(long, env = "MARKETBRIEF_CONFIG")]
    config: Option<PathBuf>,

    /// Keep chunks in memory instead of PostgreSQL and skip archiving
    #[arg(long)]
    dry_run: bool,

    /// Embed and store documents even if they carry an embed marker
    #[arg(long)]
    reembed: bool,

    /// Do not upload artifacts to object storage
    #[arg(long)]
    no_archive: bool,
}

impl Cli {
    fn date_range(&self, today: NaiveDate) -> Result<DateRange, ConfigError> {
        match (self.date, self.datefrom, self.dateto) {
            (Some(date), _, _) => Ok(DateRange::single(date)),
            (None, Some(from), Some(to)) => DateRange::new(from, to),
            _ => Ok(DateRange::single(today)),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("marketbrief=debug,info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) if summary.has_discovery_failures() => {
            error!(
                dates = summary.discovery_failures.len(),
                "report discovery failed for some dates"
            );
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let range = cli.date_range(chrono::Local::now().date_naive())?;

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    info!("MarketBrief {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        from = %range.start(),
        to = %range.end(),
        dry_run = cli.dry_run,
        reembed = cli.reembed,
        "run configured"
    );

    let services = build_services(&config, &cli).await?;
    let options = PipelineOptions {
        data_dir: config.storage.data_dir.clone(),
        chunker: config.chunking.chunker(),
        filter: config.chunking.filter(),
        batch_size: config.embedding.batch_size,
        embed_marker: config.pipeline.embed_marker,
        reembed: cli.reembed,
    };
    let pipeline = Pipeline::new(services, options)?;

    pipeline.init().await.context("failed to initialise pipeline services")?;
    let summary = pipeline.run_range(range).await;
    if let Err(e) = pipeline.shutdown().await {
        warn!("service shutdown failed: {e}");
    }

    info!(
        reports = summary.reports(),
        failed = summary.failed_reports(),
        chunks = summary.chunks_stored(),
        duration_ms = summary.duration_ms,
        "MarketBrief finished"
    );
    Ok(summary)
}

fn http_client(timeout_secs: u64) -> anyhow::Result<SandboxClient> {
    SandboxClient::with_timeout(Duration::from_secs(timeout_secs))
        .context("failed to build HTTP client")
}

async fn build_services(config: &Config, cli: &Cli) -> anyhow::Result<PipelineServices> {
    let source = EtfCheckSource::new(
        config.discovery.feed.clone(),
        http_client(config.discovery.timeout_secs)?,
    );
    let fetcher = HttpFetcher::new(http_client(config.discovery.timeout_secs)?);

    Ok(PipelineServices {
        source: Arc::new(source),
        fetcher: Arc::new(fetcher),
        extractor: build_extractor(config)?,
        summarizer: build_summarizer(config)?,
        embedder: build_embedder(config)?,
        store: build_store(config, cli.dry_run).await?,
        archiver: build_archiver(config, cli.dry_run || cli.no_archive)?,
    })
}

fn build_extractor(config: &Config) -> anyhow::Result<Arc<dyn TextExtractor>> {
    let fast: Arc<dyn TextExtractor> = Arc::new(LopdfExtractor);
    let Some(url) = config.extraction.docling_url.as_deref() else {
        info!("Text extraction: lopdf");
        return Ok(fast);
    };
    let docling = DoclingExtractor::new(Some(url), http_client(config.extraction.timeout_secs)?);
    info!("Text extraction: docling at {url}, lopdf fallback");
    Ok(Arc::new(FallbackExtractor::new(Arc::new(docling), fast)))
}

fn build_summarizer(config: &Config) -> anyhow::Result<Arc<dyn SummarizationService>> {
    let cfg = &config.summarizer;
    let kind = match cfg.backend {
        SummarizerBackend::Disabled => {
            info!("Summaries disabled in config");
            return Ok(Arc::new(DisabledSummarizer::new("disabled in config")));
        }
        SummarizerBackend::OpenAi => BackendKind::OpenAi,
        SummarizerBackend::OpenAiCompatible => BackendKind::OpenAiCompatible,
        SummarizerBackend::Ollama => BackendKind::Ollama,
    };
    let settings = BackendSettings {
        kind,
        model: cfg.model.clone(),
        api_key: cfg.api_key(),
        base_url: cfg.base_url.clone(),
    };

    match build_backend(&settings, http_client(cfg.timeout_secs)?) {
        Ok(backend) => {
            info!("Summaries: {} / {}", backend.name(), backend.model_id());
            Ok(Arc::new(LlmSummarizer::new(backend, cfg.options())))
        }
        Err(LlmError::NotConfigured(reason)) => {
            warn!("Summaries unavailable ({reason}); set summarizer.api_key or OPENAI_API_KEY");
            Ok(Arc::new(DisabledSummarizer::new(reason)))
        }
        Err(e) => Err(e).context("failed to build summarizer backend"),
    }
}

fn build_embedder(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingService>> {
    let cfg = &config.embedding;
    let backend = match cfg.backend {
        EmbeddingBackend::Local => return build_local_embedder(config),
        EmbeddingBackend::OpenAi => RemoteBackend::OpenAi,
        EmbeddingBackend::OpenAiCompatible => RemoteBackend::OpenAiCompatible,
        EmbeddingBackend::Ollama => RemoteBackend::Ollama,
    };
    if backend == RemoteBackend::OpenAi && cfg.api_key.is_none() {
        anyhow::bail!(ConfigError::Invalid(
            "embedding.backend = \"open_ai\" needs embedding.api_key or OPENAI_API_KEY".into()
        ));
    }
    info!("Embeddings: {:?} / {} ({} dims)", backend, cfg.model, cfg.dim);
    let remote = RemoteEmbeddingConfig {
        backend,
        model: cfg.model.clone(),
        dim: cfg.dim,
        api_key: cfg.api_key(),
        base_url: cfg.base_url.clone(),
        normalize: cfg.normalize,
    };
    Ok(Arc::new(EmbeddingClient::new(remote, http_client(cfg.timeout_secs)?)))
}

#[cfg(feature = "local-embed")]
fn build_local_embedder(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingService>> {
    use marketbrief_ingestion::embedding::LocalEmbedder;

    let cfg = &config.embedding;
    let local = marketbrief_embed::EmbeddingConfig {
        use_gpu: cfg.use_gpu,
        normalize: cfg.normalize,
        ..marketbrief_embed::EmbeddingConfig::cpu()
    }
    .with_model(&cfg.model)
    .with_max_length(cfg.max_length)
    .with_truncate(cfg.truncate);
    info!("Embeddings: local {} ({} dims)", cfg.model, cfg.dim);
    Ok(Arc::new(LocalEmbedder::new(local, cfg.dim)))
}

#[cfg(not(feature = "local-embed"))]
fn build_local_embedder(_config: &Config) -> anyhow::Result<Arc<dyn EmbeddingService>> {
    anyhow::bail!(ConfigError::Invalid(
        "embedding.backend = \"local\" needs a build with the `local-embed` feature".into()
    ))
}

async fn build_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn ChunkStore>> {
    let dim = config.database.embedding_dim;
    if dry_run {
        info!("Dry run: chunks are kept in memory");
        return Ok(Arc::new(MemoryChunkStore::with_dimension(dim)));
    }

    let url = config.database.url.as_deref().ok_or_else(|| {
        ConfigError::Invalid("database.url or DATABASE_URL is required (or pass --dry-run)".into())
    })?;
    let table = TableName::parse(&config.database.table)?;
    info!("Connecting to PostgreSQL...");
    let store = PgChunkStore::connect(url, table, dim)
        .await
        .context("failed to connect to PostgreSQL")?;
    store.ensure_schema().await.context("failed to prepare chunk table")?;
    info!("PostgreSQL connected, table {}", store.table().qualified());
    Ok(Arc::new(store))
}

fn build_archiver(config: &Config, disabled: bool) -> anyhow::Result<Option<Arc<dyn Archiver>>> {
    let cfg = &config.archive;
    if disabled || !cfg.enabled {
        info!("Archiving disabled");
        return Ok(None);
    }
    let endpoint = cfg
        .endpoint
        .clone()
        .ok_or_else(|| ConfigError::Invalid("archive.enabled requires archive.endpoint".into()))?;
    info!("Archiving to {endpoint}/{}", cfg.bucket);
    let store = HttpObjectStore::new(endpoint, cfg.bucket.clone(), cfg.token(), http_client(cfg.timeout_secs)?);
    Ok(Some(Arc::new(store)))
}
