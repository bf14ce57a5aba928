//! Document download.

use async_trait::async_trait;
use marketbrief_common::SandboxClient;
use tracing::{debug, instrument};

use crate::error::FetchError;

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Plain GET through the sandboxed client.
pub struct HttpFetcher {
    client: SandboxClient,
}

impl HttpFetcher {
    pub fn new(client: SandboxClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.client.get(url)?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::Empty(url.to_string()));
        }
        debug!(bytes = bytes.len(), "document downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_ok_and_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/upload/file/202403/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/upload/file/202403/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(SandboxClient::new().unwrap());
        let bytes = fetcher
            .fetch(&format!("{}/upload/file/202403/a.pdf", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let err = fetcher
            .fetch(&format!("{}/upload/file/202403/missing.pdf", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_blocked_host() {
        let fetcher = HttpFetcher::new(SandboxClient::new().unwrap());
        let err = fetcher.fetch("https://evil.example.com/x.pdf").await.unwrap_err();
        assert!(matches!(err, FetchError::Sandbox(_)));
    }
}
