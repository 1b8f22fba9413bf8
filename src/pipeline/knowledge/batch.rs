//! One extraction round: build the request, call the model, parse the batch.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use super::parser::parse_knowledge_response;
use super::prompt::build_extraction_request;
use super::ExtractionError;
use crate::config::BatchLimits;
use crate::models::{DocumentPayload, KnowledgeBatch, KnowledgeRecord};
use crate::pipeline::llm::LlmClient;

/// Runs single extraction rounds against a model.
#[derive(Clone)]
pub struct BatchExtractor {
    llm: Arc<dyn LlmClient>,
    limits: BatchLimits,
}

impl BatchExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, limits: BatchLimits) -> Self {
        Self { llm, limits }
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Extract the next batch from `document`.
    ///
    /// With no `prior`, a batch with nothing in it is an error. With `prior`,
    /// an empty batch means the source is used up and comes back as
    /// [`KnowledgeBatch::exhausted`], whatever flag the model reported.
    pub async fn run_batch(
        &self,
        document: &DocumentPayload,
        prior: Option<&KnowledgeRecord>,
    ) -> Result<KnowledgeBatch, ExtractionError> {
        let span = tracing::info_span!(
            "extraction_round",
            document = %document.name,
            model = self.llm.model_name(),
            continuation = prior.is_some(),
        );
        let start = Instant::now();

        let request = build_extraction_request(document, &self.limits, prior);
        let raw = self.llm.generate(&request).instrument(span.clone()).await?;
        let _guard = span.enter();

        if raw.trim().is_empty() {
            tracing::warn!("Model returned no text for extraction round");
            return Err(ExtractionError::EmptyResponse);
        }

        let batch = parse_knowledge_response(&raw)?;

        if batch.is_empty() {
            if prior.is_some() {
                tracing::info!(
                    reported_more = batch.has_more_content,
                    "Continuation round found nothing new, treating source as exhausted"
                );
                return Ok(KnowledgeBatch::exhausted());
            }
            return Err(ExtractionError::NoExtractableKnowledge);
        }

        tracing::info!(
            diseases = batch.disease_classifications.len(),
            mappings = batch.symptom_mappings.len(),
            thoughts = batch.master_thoughts.len(),
            has_more_content = batch.has_more_content,
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction round complete"
        );

        Ok(batch)
    }
}
