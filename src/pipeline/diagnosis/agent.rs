use std::sync::Arc;
use std::time::Instant;

use super::prompt::{build_diagnosis_request, validate_query, PatientQuery};
use super::DiagnosisError;
use crate::models::KnowledgeRecord;
use crate::pipeline::llm::LlmClient;

/// Answers patient cases using one master's knowledge.
#[derive(Clone)]
pub struct DiagnosisAgent {
    llm: Arc<dyn LlmClient>,
}

impl DiagnosisAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Returns the model's Markdown narrative.
    ///
    /// Input problems are reported before the model is contacted.
    pub async fn diagnose(
        &self,
        knowledge: Option<&KnowledgeRecord>,
        query: &PatientQuery,
    ) -> Result<String, DiagnosisError> {
        let knowledge = validate_query(knowledge, query)?;
        let request = build_diagnosis_request(knowledge, query);

        let start = Instant::now();
        let text = self.llm.generate(&request).await?;

        if text.trim().is_empty() {
            tracing::warn!(model = self.llm.model_name(), "Diagnosis returned no text");
            return Err(DiagnosisError::EmptyResponse);
        }

        tracing::info!(
            model = self.llm.model_name(),
            mappings = knowledge.symptom_mappings.len(),
            response_chars = text.chars().count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Diagnosis complete"
        );

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{LlmError, MockLlmClient};

    fn knowledge() -> KnowledgeRecord {
        KnowledgeRecord {
            disease_classifications: vec!["外感发热".into()],
            master_thoughts: vec!["表证宜汗".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn returns_model_narrative() {
        let mock = Arc::new(MockLlmClient::new("### 1. 辨证过程\n风寒束表"));
        let agent = DiagnosisAgent::new(mock.clone());
        let text = agent
            .diagnose(Some(&knowledge()), &PatientQuery::from("发热恶寒，无汗"))
            .await
            .unwrap();
        assert!(text.starts_with("### 1. 辨证过程"));
        assert_eq!(mock.call_count(), 1);
        assert!(mock.requests()[0].system_instruction.is_some());
    }

    #[tokio::test]
    async fn missing_knowledge_makes_no_model_call() {
        let mock = Arc::new(MockLlmClient::new("unused"));
        let agent = DiagnosisAgent::new(mock.clone());
        let result = agent.diagnose(None, &PatientQuery::from("发热")).await;
        assert!(matches!(result, Err(DiagnosisError::InvalidQuery(_))));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn blank_symptoms_make_no_model_call() {
        let mock = Arc::new(MockLlmClient::new("unused"));
        let agent = DiagnosisAgent::new(mock.clone());
        let result = agent.diagnose(Some(&knowledge()), &PatientQuery::from(" ")).await;
        assert!(matches!(result, Err(DiagnosisError::InvalidQuery(_))));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_text_is_an_error() {
        let agent = DiagnosisAgent::new(Arc::new(MockLlmClient::new("")));
        let result = agent
            .diagnose(Some(&knowledge()), &PatientQuery::from("发热"))
            .await;
        assert_eq!(result, Err(DiagnosisError::EmptyResponse));
    }

    #[tokio::test]
    async fn model_errors_pass_through() {
        let agent = DiagnosisAgent::new(Arc::new(MockLlmClient::failing(LlmError::Api {
            status: 429,
            body: "quota".into(),
        })));
        let result = agent
            .diagnose(Some(&knowledge()), &PatientQuery::from("发热"))
            .await;
        assert!(matches!(result, Err(DiagnosisError::Llm(LlmError::Api { status: 429, .. }))));
    }
}
