//! Document ingestion checks.
//!
//! Turns raw uploaded bytes into a `DocumentPayload` the model can accept,
//! rejecting oversized files and formats the model cannot read.

pub mod format;

pub use format::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    PayloadTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Legacy .doc format is not supported: {0}")]
    LegacyDoc(String),
}

impl IngestError {
    pub fn user_message(&self) -> String {
        match self {
            Self::PayloadTooLarge { max_mb, .. } => {
                format!("文件过大，请上传小于 {max_mb}MB 的文件。")
            }
            Self::LegacyDoc(_) => {
                "暂不支持 .doc 格式，请将其另存为 .docx 格式后重新上传。".to_string()
            }
            Self::UnsupportedFormat(_) => "暂不支持该文件格式。".to_string(),
        }
    }
}
