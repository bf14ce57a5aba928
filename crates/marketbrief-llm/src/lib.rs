//! marketbrief-llm: chat-completion backends used for report summaries.
//!
//! All backends speak the OpenAI chat-completions wire format and send their
//! requests through a [`marketbrief_common::SandboxClient`].

pub mod audit;
pub mod backend;

pub use audit::LlmCallRecord;
pub use backend::{
    build_backend, BackendKind, BackendSettings, LlmBackend, LlmError, LlmRequest, LlmResponse,
    Message, OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend,
};
