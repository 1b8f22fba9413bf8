use serde::{Deserialize, Serialize};

use super::DiagnosisError;
use crate::models::KnowledgeRecord;
use crate::pipeline::llm::GenerateRequest;

pub const MISSING_KNOWLEDGE_REASON: &str = "该泰斗尚未提取知识，请先上传中医文献以构建智能体。";
pub const MISSING_SYMPTOMS_REASON: &str = "请输入患者症状。";

/// A patient case, either as free text or as the three intake fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatientQuery {
    Narrative(String),
    Structured {
        symptoms: String,
        #[serde(default)]
        tongue: Option<String>,
        #[serde(default)]
        pulse: Option<String>,
    },
}

impl PatientQuery {
    /// The field that must be non-blank for a query to be valid.
    pub fn primary_symptoms(&self) -> &str {
        match self {
            Self::Narrative(text) => text,
            Self::Structured { symptoms, .. } => symptoms,
        }
    }

    /// Case text as it appears in the prompt. Blank optional fields are left out.
    pub fn render(&self) -> String {
        match self {
            Self::Narrative(text) => text.trim().to_string(),
            Self::Structured {
                symptoms,
                tongue,
                pulse,
            } => {
                let mut lines = vec![format!("症状：{}", symptoms.trim())];
                if let Some(tongue) = tongue.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                    lines.push(format!("舌象：{tongue}"));
                }
                if let Some(pulse) = pulse.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
                    lines.push(format!("脉象：{pulse}"));
                }
                lines.join("\n")
            }
        }
    }
}

impl From<&str> for PatientQuery {
    fn from(text: &str) -> Self {
        Self::Narrative(text.to_string())
    }
}

/// Check the inputs before any model call is made.
pub fn validate_query<'a>(
    knowledge: Option<&'a KnowledgeRecord>,
    query: &PatientQuery,
) -> Result<&'a KnowledgeRecord, DiagnosisError> {
    let knowledge =
        knowledge.ok_or_else(|| DiagnosisError::InvalidQuery(MISSING_KNOWLEDGE_REASON.into()))?;
    if query.primary_symptoms().trim().is_empty() {
        return Err(DiagnosisError::InvalidQuery(MISSING_SYMPTOMS_REASON.into()));
    }
    Ok(knowledge)
}

/// System instruction: the full knowledge record plus the answer rules.
pub fn build_system_instruction(knowledge: &KnowledgeRecord) -> String {
    let knowledge_json =
        serde_json::to_string_pretty(knowledge).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an AI Agent embodying the knowledge of a specific Traditional Chinese Medicine master.
You MUST base your diagnosis and prescription strictly on the provided Extracted Knowledge Base.
Do not use generic TCM knowledge if it contradicts the master's specific rules.

Extracted Knowledge Base:
{knowledge_json}

IMPORTANT: You MUST provide your response entirely in Chinese (简体中文).

Format your response as follows using Markdown:
### 1. 辨证过程 (Diagnostic Process)
Explain the reasoning based on the patient's case, mapping their symptoms, tongue, and pulse to the knowledge base.

### 2. 建议方案 (Suggested Plan)
State the treatment principle (治法), base prescription (方剂), and specific modifications (加减).

### 3. 书中依据 (Source Reference)
Cite the relevant "Master's Thoughts" or specific mappings from the knowledge base that justify this decision.
"#
    )
}

pub fn build_case_prompt(query: &PatientQuery) -> String {
    format!(
        "患者病案/描述 (Patient Case/Description):\n{}\n\n请基于泰斗的知识库提供诊疗方案。 (Please provide a diagnosis and prescription based on the master's knowledge.)",
        query.render()
    )
}

pub fn build_diagnosis_request(knowledge: &KnowledgeRecord, query: &PatientQuery) -> GenerateRequest {
    GenerateRequest::text(build_case_prompt(query))
        .with_system_instruction(build_system_instruction(knowledge))
}
