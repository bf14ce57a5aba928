use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("network capabilities capped: domain not in allowlist for URL {0}")]
    Blocked(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// An HTTP client that only allows requests to approved hosts.
///
/// Every outbound call of the pipeline (report feed, PDF download, Docling,
/// embedding API, archive) goes through one of these.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Client with the default allowlist and a 30s timeout.
    pub fn new() -> Result<Self, SandboxError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, SandboxError> {
        let domains = [
            "www.etfcheck.co.kr", // report feed + PDF uploads
            "api.openai.com",     // summaries, embeddings
            "huggingface.co",     // local embedding model download
            "cdn-lfs.huggingface.co",
            "localhost",          // Docling, Ollama
            "127.0.0.1",
        ];
        let allowlist = domains.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("marketbrief/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Appends the host of `url`; ignored when the URL does not parse.
    pub fn allow_url(&mut self, url: &str) {
        if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            self.allowlist.insert(host);
        }
    }

    /// Exact match or subdomain of an allowed host.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    fn check(&self, url: &str) -> Result<(), SandboxError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(SandboxError::Blocked(url.to_string()))
        }
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, SandboxError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, SandboxError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    pub fn put(&self, url: &str) -> Result<reqwest::RequestBuilder, SandboxError> {
        self.check(url)?;
        Ok(self.client.put(url))
    }
}
