//! Resumable multi-round extraction over one document.
//!
//! A session holds nothing beyond `(document, knowledge)`; its state is
//! derived from those two values, so a session rebuilt from persisted data
//! continues exactly where it stopped.

use serde::Serialize;

use super::batch::BatchExtractor;
use super::merge::merge;
use super::ExtractionError;
use crate::models::{DocumentPayload, KnowledgeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoDocument,
    /// A document is attached and no round has reported on it yet.
    ReadyForFirstExtraction,
    /// The last round said the document has more to give.
    HasKnowledge,
    Exhausted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDocument => "no_document",
            Self::ReadyForFirstExtraction => "ready_for_first_extraction",
            Self::HasKnowledge => "has_knowledge",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionSession {
    document: Option<DocumentPayload>,
    knowledge: Option<KnowledgeRecord>,
}

impl ExtractionSession {
    pub fn new(document: Option<DocumentPayload>, knowledge: Option<KnowledgeRecord>) -> Self {
        Self {
            document,
            knowledge,
        }
    }

    pub fn document(&self) -> Option<&DocumentPayload> {
        self.document.as_ref()
    }

    pub fn knowledge(&self) -> Option<&KnowledgeRecord> {
        self.knowledge.as_ref()
    }

    pub fn into_knowledge(self) -> Option<KnowledgeRecord> {
        self.knowledge
    }

    /// Attach a new source document.
    ///
    /// Existing knowledge carries forward as prior knowledge for the next
    /// round, but its continuation flag is cleared: it described the old
    /// document.
    pub fn attach_document(&mut self, document: DocumentPayload) {
        if let Some(knowledge) = self.knowledge.as_mut() {
            knowledge.has_more_content = None;
        }
        tracing::debug!(document = %document.name, mime_type = %document.mime_type, "Document attached");
        self.document = Some(document);
    }

    pub fn state(&self) -> SessionState {
        if self.document.is_none() {
            return SessionState::NoDocument;
        }
        match self.knowledge.as_ref().and_then(|k| k.has_more_content) {
            None => SessionState::ReadyForFirstExtraction,
            Some(true) => SessionState::HasKnowledge,
            Some(false) => SessionState::Exhausted,
        }
    }

    /// Run one round and fold it into the session's knowledge.
    ///
    /// The session only changes when the round succeeds; any error leaves
    /// document and knowledge exactly as they were. Running again after
    /// exhaustion is allowed and simply issues another round.
    pub async fn extract_next(
        &mut self,
        extractor: &BatchExtractor,
    ) -> Result<KnowledgeRecord, ExtractionError> {
        let document = self.document.as_ref().ok_or(ExtractionError::NoDocument)?;

        if self.state() == SessionState::Exhausted {
            tracing::warn!(
                document = %document.name,
                "Extraction requested on an exhausted document"
            );
        }

        let prior = self.knowledge.as_ref();
        let batch = extractor.run_batch(document, prior).await?;
        let updated = merge(prior.unwrap_or(&KnowledgeRecord::default()), &batch);

        self.knowledge = Some(updated.clone());
        Ok(updated)
    }

    /// Keep extracting until the document is exhausted or `max_rounds`
    /// rounds have run. Returns the number of rounds that succeeded.
    ///
    /// Stops at the first error; knowledge from earlier rounds is kept.
    pub async fn run_to_completion(
        &mut self,
        extractor: &BatchExtractor,
        max_rounds: usize,
    ) -> Result<usize, ExtractionError> {
        let mut rounds = 0;
        while rounds < max_rounds && self.state() != SessionState::Exhausted {
            self.extract_next(extractor).await?;
            rounds += 1;
        }
        tracing::info!(rounds, state = self.state().as_str(), "Extraction session finished");
        Ok(rounds)
    }
}
