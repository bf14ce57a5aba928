//! Configuration loading for MarketBrief.
//! Reads marketbrief.toml from `--config`, the MARKETBRIEF_CONFIG env var, or
//! the current directory. Every field has a default, so a missing file is not
//! an error.

use std::path::{Path, PathBuf};

use marketbrief_common::ConfigError;
use marketbrief_db::{DEFAULT_TABLE, EMBEDDING_DIM};
use marketbrief_ingestion::chunker::{default_boilerplate, ChunkFilter, ChunkerConfig};
use marketbrief_ingestion::sources::EtfCheckConfig;
use marketbrief_ingestion::summarizer::SummarizerOptions;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "marketbrief.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub discovery: DiscoveryConfig,
    pub extraction: ExtractionConfig,
    pub summarizer: SummarizerConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub archive: ArchiveConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Overridden by DATABASE_URL.
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_dim")]
    pub embedding_dim: usize,
}

fn default_table() -> String { DEFAULT_TABLE.to_string() }
fn default_dim()   -> usize  { EMBEDDING_DIM }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, table: default_table(), embedding_dim: default_dim() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(flatten)]
    pub feed: EtfCheckConfig,
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
}

fn default_discovery_timeout() -> u64 { 30 }

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { feed: EtfCheckConfig::default(), timeout_secs: default_discovery_timeout() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Docling service; when unset only the in-process extractor is used.
    pub docling_url: Option<String>,
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

fn default_extraction_timeout() -> u64 { 120 }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { docling_url: None, timeout_secs: default_extraction_timeout() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizerBackend {
    OpenAi,
    OpenAiCompatible,
    Ollama,
    Disabled,
}

#[derive(Debug, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_summarizer_backend")]
    pub backend: SummarizerBackend,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    /// Falls back to OPENAI_API_KEY.
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
}

fn default_summarizer_backend() -> SummarizerBackend { SummarizerBackend::OpenAi }
fn default_summarizer_model()   -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens()         -> u32    { 1024 }
fn default_temperature()        -> f32    { 0.5 }
fn default_max_input_chars()    -> usize  { 60_000 }
fn default_summarizer_timeout() -> u64    { 120 }

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            backend: default_summarizer_backend(),
            model: default_summarizer_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_summarizer_timeout(),
        }
    }
}

impl SummarizerConfig {
    pub fn options(&self) -> SummarizerOptions {
        SummarizerOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            max_input_chars: self.max_input_chars,
        }
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| k.expose_secret().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Local,
    OpenAi,
    OpenAiCompatible,
    Ollama,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_dim")]
    pub dim: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "bool_true")]
    pub normalize: bool,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "bool_true")]
    pub truncate: bool,
    /// Local backend only.
    #[serde(default)]
    pub use_gpu: bool,
    /// Falls back to OPENAI_API_KEY for the `open_ai` backend.
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_backend() -> EmbeddingBackend { EmbeddingBackend::Local }
fn default_embed_model()       -> String { "intfloat/e5-base-v2".to_string() }
fn default_batch_size()        -> usize  { 32 }
fn default_max_length()        -> usize  { 512 }
fn default_embedding_timeout() -> u64    { 60 }
fn bool_true()                 -> bool   { true }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embed_model(),
            dim: default_dim(),
            batch_size: default_batch_size(),
            normalize: true,
            max_length: default_max_length(),
            truncate: true,
            use_gpu: false,
            api_key: None,
            base_url: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| k.expose_secret().to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_digit_ratio")]
    pub max_digit_ratio: f32,
    #[serde(default = "default_boilerplate")]
    pub boilerplate: Vec<String>,
}

fn default_chunk_size()      -> usize { marketbrief_ingestion::chunker::DEFAULT_CHUNK_SIZE }
fn default_overlap()         -> usize { marketbrief_ingestion::chunker::DEFAULT_OVERLAP }
fn default_min_chars()       -> usize { 30 }
fn default_max_digit_ratio() -> f32   { 0.5 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chars: default_min_chars(),
            max_digit_ratio: default_max_digit_ratio(),
            boilerplate: default_boilerplate(),
        }
    }
}

impl ChunkingConfig {
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig { chunk_size: self.chunk_size, overlap: self.overlap }
    }

    pub fn filter(&self) -> ChunkFilter {
        ChunkFilter {
            min_chars: self.min_chars,
            max_digit_ratio: self.max_digit_ratio,
            boilerplate: self.boilerplate.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Falls back to MARKETBRIEF_ARCHIVE_TOKEN.
    pub token: Option<SecretString>,
    #[serde(default = "default_archive_timeout")]
    pub timeout_secs: u64,
}

fn default_bucket()          -> String { marketbrief_ingestion::archive::DEFAULT_BUCKET.to_string() }
fn default_archive_timeout() -> u64    { 60 }

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            bucket: default_bucket(),
            token: None,
            timeout_secs: default_archive_timeout(),
        }
    }
}

impl ArchiveConfig {
    pub fn token(&self) -> Option<String> {
        self.token.as_ref().map(|t| t.expose_secret().to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "bool_true")]
    pub embed_marker: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { embed_marker: true }
    }
}


impl Config {
    /// Load `path`, else MARKETBRIEF_CONFIG, else `./marketbrief.toml`, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("MARKETBRIEF_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
            Self::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?
        } else {
            tracing::warn!(
                "Config file not found: {}; using defaults. \
                 Copy marketbrief.example.toml to marketbrief.toml and edit it.",
                path.display()
            );
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Environment values fill in what the file leaves open; DATABASE_URL
    /// always wins.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            if self.summarizer.api_key.is_none() {
                self.summarizer.api_key = Some(SecretString::from(key.clone()));
            }
            if self.embedding.api_key.is_none() && self.embedding.backend == EmbeddingBackend::OpenAi {
                self.embedding.api_key = Some(SecretString::from(key));
            }
        }
        if self.archive.token.is_none() {
            if let Some(token) = non_empty("MARKETBRIEF_ARCHIVE_TOKEN") {
                self.archive.token = Some(SecretString::from(token));
            }
        }
    }

    /// Checks run before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.chunker().validate()?;

        if !(0.0..=1.0).contains(&self.chunking.max_digit_ratio) {
            return Err(ConfigError::Invalid(format!(
                "chunking.max_digit_ratio must be within 0..=1, got {}",
                self.chunking.max_digit_ratio
            )));
        }
        if self.database.table.trim().is_empty() {
            return Err(ConfigError::Invalid("database.table must not be empty".into()));
        }
        if self.database.embedding_dim != self.embedding.dim {
            return Err(ConfigError::Invalid(format!(
                "database.embedding_dim ({}) does not match embedding.dim ({})",
                self.database.embedding_dim, self.embedding.dim
            )));
        }
        if self.embedding.dim == 0 || self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dim and embedding.batch_size must be positive".into(),
            ));
        }
        if self.archive.enabled && self.archive.endpoint.is_none() {
            return Err(ConfigError::Invalid("archive.enabled requires archive.endpoint".into()));
        }
        Ok(())
    }
}
