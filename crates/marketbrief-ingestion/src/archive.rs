//! Artifact archiving to object storage.
//!
//! Uploads are best effort: the orchestrator logs failures and carries on.

use std::path::Path;

use async_trait::async_trait;
use marketbrief_common::SandboxClient;
use tracing::{debug, instrument};

use crate::error::UploadError;

pub const DEFAULT_BUCKET: &str = "market-brief-ai-data";

#[async_trait]
pub trait Archiver: Send + Sync {
    async fn upload(&self, local: &Path, key: &str) -> Result<(), UploadError>;
}

/// `PUT {endpoint}/{bucket}/{key}` against an S3-compatible gateway.
pub struct HttpObjectStore {
    endpoint: String,
    bucket: String,
    token: Option<String>,
    client: SandboxClient,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<String>,
        mut client: SandboxClient,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        client.allow_url(&endpoint);
        Self { endpoint, bucket: bucket.into(), token, client }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key.trim_start_matches('/'))
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        _ => "text/plain; charset=utf-8",
    }
}

#[async_trait]
impl Archiver for HttpObjectStore {
    #[instrument(skip(self, local))]
    async fn upload(&self, local: &Path, key: &str) -> Result<(), UploadError> {
        let body = tokio::fs::read(local).await.map_err(|source| UploadError::Read {
            path: local.to_path_buf(),
            source,
        })?;
        let mut req = self
            .client
            .put(&self.object_url(key))?
            .header(reqwest::header::CONTENT_TYPE, content_type(local))
            .body(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(UploadError::Status { key: key.to_string(), status: resp.status().as_u16() });
        }
        debug!(bucket = %self.bucket, "artifact archived");
        Ok(())
    }
}

/// Archiving disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArchiver;

#[async_trait]
impl Archiver for NoopArchiver {
    async fn upload(&self, _local: &Path, _key: &str) -> Result<(), UploadError> {
        Ok(())
    }
}
