//! Language-model transport.
//!
//! The pipeline talks to the model only through `LlmClient`, so the Gemini
//! client can be swapped for the scripted mock in tests.

pub mod gemini;
pub mod mock;

pub use gemini::GeminiClient;
pub use mock::MockLlmClient;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Model endpoint is not reachable at {0}")]
    Connection(String),

    #[error("Model API returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "提取过程中发生错误。文件可能过大或 API 请求超时。",
            Self::Config(_) => "缺少 GEMINI_API_KEY 环境变量",
            _ => "模型服务暂时不可用，请稍后重试。",
        }
    }
}

/// One piece of request content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContentPart {
    /// Base64 document bytes with their MIME type.
    InlineData { mime_type: String, data: String },
    Text(String),
}

/// A single request/response model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub parts: Vec<ContentPart>,
    /// When set, the model must answer with JSON matching this schema.
    pub response_schema: Option<serde_json::Value>,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::Text(prompt.into())],
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Concatenated text parts, mostly for logging and tests.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Model client abstraction (allows mocking).
///
/// Returns the final response text; an empty string means the model produced
/// nothing (including blocked responses).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;

    /// Model name, for logging.
    fn model_name(&self) -> &str;
}
