//! Single-shot diagnosis grounded in one master's knowledge.
//!
//! Stateless per call: the whole knowledge record goes into the system
//! instruction, the patient case goes into the prompt, and the model's
//! Markdown narrative comes back untouched.

pub mod agent;
pub mod prompt;

pub use agent::DiagnosisAgent;
pub use prompt::*;

use thiserror::Error;

use crate::pipeline::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosisError {
    /// Carries the reason shown to the user.
    #[error("Invalid diagnosis query: {0}")]
    InvalidQuery(String),

    #[error("Model returned an empty diagnosis")]
    EmptyResponse,

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),
}

impl DiagnosisError {
    pub fn user_message(&self) -> &str {
        match self {
            Self::InvalidQuery(reason) => reason,
            Self::EmptyResponse => "未能生成诊疗方案。",
            Self::Llm(_) => "生成诊疗方案失败。",
        }
    }
}
