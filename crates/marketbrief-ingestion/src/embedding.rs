//! Embedding stage.
//!
//! [`EmbeddingService`] is the seam between the pipeline and a model.
//! [`embed_chunks`] batches inputs and checks every batch against the
//! service's declared shape before anything reaches the store.
//!
//! Backends:
//!   - `EmbeddingClient`: OpenAI, OpenAI-compatible, Ollama over HTTP
//!   - `LocalEmbedder`:   in-process e5 model (feature `local-embed`)

use async_trait::async_trait;
use marketbrief_common::SandboxClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::EmbeddingError;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn model_id(&self) -> &str;

    /// Length of every vector this service returns.
    fn dimension(&self) -> usize;

    async fn init(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn shutdown(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Embed `texts` in batches of `batch_size`, preserving order.
#[instrument(skip(service, texts), fields(n = texts.len(), model = service.model_id()))]
pub async fn embed_chunks(
    service: &dyn EmbeddingService,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<EmbeddedChunk>, EmbeddingError> {
    let mut out = Vec::with_capacity(texts.len());
    if texts.is_empty() {
        return Ok(out);
    }

    let dim = service.dimension();
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = service.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::InvalidBufferSize {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        for (text, embedding) in batch.iter().zip(vectors) {
            if embedding.len() != dim {
                return Err(EmbeddingError::DimensionMismatch {
                    index: out.len(),
                    expected: dim,
                    actual: embedding.len(),
                });
            }
            out.push(EmbeddedChunk { text: text.clone(), embedding });
        }
    }
    debug!(n = out.len(), "chunks embedded");
    Ok(out)
}

/// In-place L2 normalisation; zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

// ── HTTP backends ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBackend {
    OpenAi,
    OpenAiCompatible,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct RemoteEmbeddingConfig {
    pub backend: RemoteBackend,
    pub model: String,
    pub dim: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub normalize: bool,
}

impl RemoteEmbeddingConfig {
    fn base_url(&self) -> &str {
        let default = match self.backend {
            RemoteBackend::OpenAi => "https://api.openai.com",
            RemoteBackend::OpenAiCompatible | RemoteBackend::Ollama => "http://localhost:11434",
        };
        self.base_url.as_deref().unwrap_or(default).trim_end_matches('/')
    }
}

pub struct EmbeddingClient {
    cfg: RemoteEmbeddingConfig,
    client: SandboxClient,
}

impl EmbeddingClient {
    pub fn new(cfg: RemoteEmbeddingConfig, mut client: SandboxClient) -> Self {
        if let Some(url) = &cfg.base_url {
            client.allow_url(url);
        }
        Self { cfg, client }
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, EmbeddingError> {
        let mut req = self.client.post(url)?.json(body);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.cfg.base_url());
        let body = serde_json::json!({ "model": &self.cfg.model, "input": texts });
        let resp = self.post_json(&url, &body).await?;
        parse_openai_embeddings(&resp)
    }

    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.cfg.base_url());
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({ "model": &self.cfg.model, "prompt": text });
            let resp = self.post_json(&url, &body).await?;
            out.push(parse_vector(&resp["embedding"])?);
        }
        Ok(out)
    }
}

#[async_trait]
impl EmbeddingService for EmbeddingClient {
    fn model_id(&self) -> &str {
        &self.cfg.model
    }

    fn dimension(&self) -> usize {
        self.cfg.dim
    }

    #[instrument(skip(self, texts), fields(n = texts.len(), backend = ?self.cfg.backend))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = match self.cfg.backend {
            RemoteBackend::OpenAi | RemoteBackend::OpenAiCompatible => self.embed_openai(texts).await?,
            RemoteBackend::Ollama => self.embed_ollama(texts).await?,
        };
        if self.cfg.normalize {
            vectors.iter_mut().for_each(|v| l2_normalize(v));
        }
        Ok(vectors)
    }
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    value
        .as_array()
        .ok_or_else(|| EmbeddingError::Backend("response has no embedding array".into()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::Backend("non-numeric embedding value".into()))
        })
        .collect()
}

fn parse_openai_embeddings(resp: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = resp["data"]
        .as_array()
        .ok_or_else(|| EmbeddingError::Backend("response has no data array".into()))?;
    // Results carry an explicit index; order by it rather than trusting array order.
    let mut indexed: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let idx = item["index"].as_u64().unwrap_or(i as u64);
            parse_vector(&item["embedding"]).map(|v| (idx, v))
        })
        .collect::<Result<_, _>>()?;
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ── Local model ───────────────────────────────────────────────────────────────

#[cfg(feature = "local-embed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embed")]
mod local {
    use std::sync::Arc;

    use async_trait::async_trait;
    use marketbrief_embed::{E5Embedder, EmbedError, EmbeddingConfig};
    use tokio::sync::OnceCell;
    use tracing::info;

    use super::EmbeddingService;
    use crate::error::EmbeddingError;

    /// In-process e5 embedder. The model is loaded by `init` (or lazily on
    /// first use) and run on the blocking pool.
    pub struct LocalEmbedder {
        config: EmbeddingConfig,
        dim: usize,
        model: OnceCell<Arc<E5Embedder>>,
    }

    impl LocalEmbedder {
        pub fn new(config: EmbeddingConfig, dim: usize) -> Self {
            Self { config, dim, model: OnceCell::new() }
        }

        async fn model(&self) -> Result<Arc<E5Embedder>, EmbeddingError> {
            self.model
                .get_or_try_init(|| async {
                    let model = E5Embedder::new(self.config.clone()).await.map_err(map_err)?;
                    if model.dimension() != self.dim {
                        return Err(EmbeddingError::DimensionMismatch {
                            index: 0,
                            expected: self.dim,
                            actual: model.dimension(),
                        });
                    }
                    info!(model = model.model_name(), gpu = model.is_gpu(), "local embedder ready");
                    Ok(Arc::new(model))
                })
                .await
                .cloned()
        }
    }

    fn map_err(e: EmbedError) -> EmbeddingError {
        match e {
            EmbedError::InputTooLong { index, tokens, max } => {
                EmbeddingError::InputTooLong { index, tokens, max }
            }
            other => EmbeddingError::Backend(other.to_string()),
        }
    }

    #[async_trait]
    impl EmbeddingService for LocalEmbedder {
        fn model_id(&self) -> &str {
            &self.config.model_id
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        async fn init(&self) -> Result<(), EmbeddingError> {
            self.model().await.map(|_| ())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let model = self.model().await?;
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || model.embed(&texts))
                .await
                .map_err(|e| EmbeddingError::Backend(format!("embedding task failed: {e}")))?
                .map_err(map_err)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Returns `[len, batch_position, 0...]` vectors, optionally misbehaving.
    struct Fake {
        dim: usize,
        drop_one: bool,
        wrong_dim: bool,
        calls: AtomicUsize,
    }

    impl Fake {
        fn new(dim: usize) -> Self {
            Self { dim, drop_one: false, wrong_dim: false, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl EmbeddingService for Fake {
        fn model_id(&self) -> &str { "fake" }
        fn dimension(&self) -> usize { self.dim }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let width = if self.wrong_dim { self.dim + 1 } else { self.dim };
            let mut out: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; width];
                    v[0] = t.len() as f32;
                    v
                })
                .collect();
            if self.drop_one {
                out.pop();
            }
            Ok(out)
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_order_preserved_across_batches() {
        let fake = Fake::new(4);
        let out = embed_chunks(&fake, &texts(7), 3).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
        let firsts: Vec<f32> = out.iter().map(|c| c.embedding[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(out[6].text, "xxxxxxx");
    }

    #[tokio::test]
    async fn test_empty_input_skips_service() {
        let fake = Fake::new(4);
        assert!(embed_chunks(&fake, &[], 8).await.unwrap().is_empty());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_short_batch_is_invalid_buffer() {
        let fake = Fake { drop_one: true, ..Fake::new(4) };
        let err = embed_chunks(&fake, &texts(3), 8).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidBufferSize { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_wrong_width_is_dimension_mismatch() {
        let fake = Fake { wrong_dim: true, ..Fake::new(4) };
        let err = embed_chunks(&fake, &texts(2), 8).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { index: 0, expected: 4, actual: 5 }));
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        let mut zero = vec![0.0f32; 3];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[test]
    fn test_openai_parse_orders_by_index() {
        let resp = serde_json::json!({"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]},
        ]});
        assert_eq!(parse_openai_embeddings(&resp).unwrap(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_openai_embeddings(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn test_compatible_backend_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [3.0, 4.0]}]
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(
            RemoteEmbeddingConfig {
                backend: RemoteBackend::OpenAiCompatible,
                model: "e5".into(),
                dim: 2,
                api_key: None,
                base_url: Some(server.uri()),
                normalize: true,
            },
            SandboxClient::new().unwrap(),
        );
        let out = embed_chunks(&client, &["passage".to_string()], 16).await.unwrap();
        assert!((out[0].embedding[0] - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_api_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let client = EmbeddingClient::new(
            RemoteEmbeddingConfig {
                backend: RemoteBackend::Ollama,
                model: "nomic-embed-text".into(),
                dim: 2,
                api_key: None,
                base_url: Some(server.uri()),
                normalize: false,
            },
            SandboxClient::new().unwrap(),
        );
        let err = client.embed_batch(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Api { status: 500, .. }));
    }
}
