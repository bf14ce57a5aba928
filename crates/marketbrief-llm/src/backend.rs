//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   OpenAiBackend:           OpenAI API (gpt-4o-mini by default)
//!   OpenAiCompatibleBackend: any OpenAI-compatible endpoint (LMStudio,
//!                             vLLM, OpenRouter, …)
//!   OllamaBackend:           local Ollama through its /v1 endpoint

use std::sync::Arc;

use async_trait::async_trait;
use marketbrief_common::{SandboxClient, SandboxError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("Backend not configured: {0}")]
    NotConfigured(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Backend returned an empty completion")]
    EmptyCompletion,
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    OpenAi,
    OpenAiCompatible,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Build a backend from settings. The endpoint host is added to the client's
/// allowlist.
pub fn build_backend(
    settings: &BackendSettings,
    mut client: SandboxClient,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    if let Some(url) = &settings.base_url {
        client.allow_url(url);
    }
    let backend: Arc<dyn LlmBackend> = match settings.kind {
        BackendKind::OpenAi => {
            let key = settings
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| LlmError::NotConfigured("OpenAI API key is missing".into()))?;
            let mut b = OpenAiBackend::new(client, key, &settings.model);
            if let Some(url) = &settings.base_url {
                b = b.with_base_url(url);
            }
            Arc::new(b)
        }
        BackendKind::OpenAiCompatible => {
            let url = settings.base_url.clone().ok_or_else(|| {
                LlmError::NotConfigured("OpenAI-compatible backend needs a base_url".into())
            })?;
            Arc::new(OpenAiCompatibleBackend::new(
                client,
                url,
                &settings.model,
                settings.api_key.clone(),
            ))
        }
        BackendKind::Ollama => {
            let url = settings.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL);
            Arc::new(OllamaBackend::new(client, url, &settings.model))
        }
    };
    Ok(backend)
}

// ── Helper: parse OpenAI-style response ──────────────────────────────────────

fn parse_openai_response(
    json: &serde_json::Value,
    fallback_model: &str,
) -> Result<LlmResponse, LlmError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(LlmError::EmptyCompletion)?
        .to_string();
    Ok(LlmResponse {
        content,
        model: json["model"].as_str().unwrap_or(fallback_model).to_string(),
        prompt_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    })
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status >= 400 {
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|body| {
                body["error"]["message"]
                    .as_str()
                    .or_else(|| body["message"].as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| text.chars().take(200).collect());
        return Err(LlmError::ApiError { status, message });
    }
    Ok(serde_json::from_str(&text)?)
}

fn chat_body(req: &LlmRequest, default_model: &str) -> serde_json::Value {
    serde_json::json!({
        "model":       req.model.as_deref().unwrap_or(default_model),
        "messages":    req.messages,
        "max_tokens":  req.max_tokens.unwrap_or(1024),
        "temperature": req.temperature.unwrap_or(0.5),
    })
}

fn chat_url(base: &str) -> String {
    format!("{}/v1/chat/completions", base.trim_end_matches('/'))
}

// ── 1. OpenAI ─────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    pub model: String,
    base_url: String,
    api_key: String,
    client: SandboxClient,
}

impl OpenAiBackend {
    pub fn new(client: SandboxClient, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Point at a proxy or a test server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.client.allow_url(&self.base_url);
        self
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let resp = self
            .client
            .post(&chat_url(&self.base_url))?
            .bearer_auth(&self.api_key)
            .json(&chat_body(&req, &self.model))
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        parse_openai_response(&json, &self.model)
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn name(&self) -> &'static str { "openai" }
}

// ── 2. OpenAI-Compatible (LMStudio, vLLM, OpenRouter, …) ──────────────────────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    client: SandboxClient,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        mut client: SandboxClient,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into();
        client.allow_url(&base_url);
        Self { base_url, model: model.into(), api_key, client }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut builder = self
            .client
            .post(&chat_url(&self.base_url))?
            .json(&chat_body(&req, &self.model));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let json = check_response_status(builder.send().await?).await?;
        parse_openai_response(&json, &self.model)
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn name(&self) -> &'static str { "openai_compatible" }
}

// ── 3. Ollama (local) ─────────────────────────────────────────────────────────

pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    client: SandboxClient,
}

impl OllamaBackend {
    pub fn new(mut client: SandboxClient, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        client.allow_url(&base_url);
        Self { base_url, model: model.into(), client }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let resp = self
            .client
            .post(&chat_url(&self.base_url))?
            .json(&chat_body(&req, &self.model))
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        parse_openai_response(&json, &self.model)
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { true }
    fn name(&self) -> &'static str { "ollama" }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
