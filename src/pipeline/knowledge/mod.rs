//! Incremental knowledge extraction.
//!
//! ```text
//! session (continuation) → batch (prompt → model → parser) → merge
//! ```
//!
//! One round extracts a bounded batch from the document, the merge engine
//! folds it into the master's knowledge, and the session decides from the
//! continuation flag whether another round is worthwhile.

pub mod prompt;
pub mod parser;
pub mod batch;
pub mod merge;
pub mod session;

pub use prompt::*;
pub use parser::*;
pub use batch::*;
pub use merge::*;
pub use session::*;

use thiserror::Error;

use crate::pipeline::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("No extractable knowledge found in the document")]
    NoExtractableKnowledge,

    #[error("No document attached to the extraction session")]
    NoDocument,

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),
}

impl ExtractionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "模型响应被拦截或为空，请尝试更换文档内容。",
            Self::MalformedResponse(_) => {
                "解析提取的知识失败。文档可能过于复杂，或者单次提取量过大导致响应被截断。"
            }
            Self::NoExtractableKnowledge => {
                "未能从文档中提取到有效的中医知识。可能是文档内容不包含相关信息，或者模型无法解析该内容。"
            }
            Self::NoDocument => "请先选择要上传的文件。",
            Self::Llm(e) => e.user_message(),
        }
    }
}
