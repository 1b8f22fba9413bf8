//! Application state shared by every host operation.
//!
//! `CoreState` owns the master roster and the current-document cache, both
//! behind `RwLock`. Model calls never run with a lock held: each operation
//! snapshots what it needs, releases the lock, awaits the model, then takes
//! the write lock again to commit and persist.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::config::TwinConfig;
use crate::models::{
    default_roster, fused_master_name, next_master_name, DocumentPayload, KnowledgeRecord,
    KnowledgeSummary, Master,
};
use crate::pipeline::diagnosis::{DiagnosisAgent, DiagnosisError, PatientQuery};
use crate::pipeline::ingest::{prepare_document, prepare_text_document, IngestError};
use crate::pipeline::knowledge::{
    fuse_knowledge, BatchExtractor, ExtractionError, ExtractionSession, MergeError, SessionState,
};
use crate::pipeline::llm::{GeminiClient, LlmClient, LlmError};
use crate::store::{JsonFileRepository, StateRepository, StoreError};

/// Knowledge fused from several masters, not yet attached to a master.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedKnowledge {
    pub knowledge: KnowledgeRecord,
    pub suggested_name: String,
    pub source_ids: Vec<String>,
}

/// A master's knowledge serialized for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeExport {
    pub file_name: String,
    pub json: String,
}

pub struct CoreState {
    masters: RwLock<Vec<Master>>,
    /// Current source document per master id.
    documents: RwLock<HashMap<String, DocumentPayload>>,
    repository: Box<dyn StateRepository>,
    extractor: BatchExtractor,
    diagnosis: DiagnosisAgent,
    config: TwinConfig,
}

impl CoreState {
    /// Load persisted state, seeding the default roster on first run.
    /// Cached documents of masters that no longer exist are dropped.
    pub fn new(
        config: TwinConfig,
        llm: Arc<dyn LlmClient>,
        repository: Box<dyn StateRepository>,
    ) -> Result<Self, CoreError> {
        let mut masters = repository.load_masters()?;
        if masters.is_empty() {
            masters = default_roster();
            repository.save_masters(&masters)?;
            tracing::info!("Seeded default master roster");
        }

        let mut documents = repository.load_documents()?;
        let before = documents.len();
        documents.retain(|id, _| masters.iter().any(|m| &m.id == id));
        if documents.len() != before {
            repository.save_documents(&documents)?;
            tracing::debug!(dropped = before - documents.len(), "Dropped orphaned documents");
        }

        tracing::info!(
            masters = masters.len(),
            documents = documents.len(),
            model = llm.model_name(),
            "Core state loaded"
        );

        Ok(Self {
            masters: RwLock::new(masters),
            documents: RwLock::new(documents),
            repository,
            extractor: BatchExtractor::new(llm.clone(), config.batch_limits),
            diagnosis: DiagnosisAgent::new(llm),
            config,
        })
    }

    /// Gemini client plus JSON files under `config.data_dir`.
    pub fn open(config: TwinConfig) -> Result<Self, CoreError> {
        let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::from_config(&config)?);
        let repository = Box::new(JsonFileRepository::new(config.data_dir.clone()));
        Self::new(config, llm, repository)
    }

    pub fn config(&self) -> &TwinConfig {
        &self.config
    }

    fn read_masters(&self) -> Result<RwLockReadGuard<'_, Vec<Master>>, CoreError> {
        self.masters.read().map_err(|_| CoreError::LockPoisoned)
    }

    fn write_masters(&self) -> Result<RwLockWriteGuard<'_, Vec<Master>>, CoreError> {
        self.masters.write().map_err(|_| CoreError::LockPoisoned)
    }

    fn read_documents(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<String, DocumentPayload>>, CoreError> {
        self.documents.read().map_err(|_| CoreError::LockPoisoned)
    }

    fn write_documents(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, DocumentPayload>>, CoreError> {
        self.documents.write().map_err(|_| CoreError::LockPoisoned)
    }

    // ── Roster ──────────────────────────────────────────────

    pub fn masters(&self) -> Result<Vec<Master>, CoreError> {
        Ok(self.read_masters()?.clone())
    }

    pub fn master(&self, master_id: &str) -> Result<Master, CoreError> {
        let masters = self.read_masters()?;
        find_master(&masters, master_id).cloned()
    }

    pub fn create_master(&self) -> Result<Master, CoreError> {
        let mut masters = self.write_masters()?;
        let master = Master::new(next_master_name(masters.len()));
        masters.push(master.clone());
        self.repository.save_masters(&masters)?;
        tracing::info!(master_id = %master.id, name = %master.name, "Master created");
        Ok(master)
    }

    pub fn rename_master(&self, master_id: &str, name: &str) -> Result<Master, CoreError> {
        let mut masters = self.write_masters()?;
        let master = find_master_mut(&mut masters, master_id)?;
        master.name = name.trim().to_string();
        let renamed = master.clone();
        self.repository.save_masters(&masters)?;
        Ok(renamed)
    }

    /// Remove a master and its cached document. The last master stays.
    pub fn delete_master(&self, master_id: &str) -> Result<(), CoreError> {
        {
            let mut masters = self.write_masters()?;
            find_master(&masters, master_id)?;
            if masters.len() <= 1 {
                return Err(CoreError::LastMaster);
            }
            masters.retain(|m| m.id != master_id);
            self.repository.save_masters(&masters)?;
        }

        let mut documents = self.write_documents()?;
        if documents.remove(master_id).is_some() {
            self.repository.save_documents(&documents)?;
        }
        tracing::info!(master_id, "Master deleted");
        Ok(())
    }

    pub fn knowledge_summary(&self, master_id: &str) -> Result<Option<KnowledgeSummary>, CoreError> {
        let masters = self.read_masters()?;
        let master = find_master(&masters, master_id)?;
        Ok(master.knowledge.as_ref().map(KnowledgeRecord::summary))
    }

    // ── Documents ───────────────────────────────────────────

    /// Validate an upload and make it the master's current document.
    pub fn attach_document(
        &self,
        master_id: &str,
        file_name: &str,
        bytes: &[u8],
        declared_mime: Option<&str>,
    ) -> Result<SessionState, CoreError> {
        let document =
            prepare_document(file_name, bytes, declared_mime, self.config.max_document_bytes)?;
        self.set_document(master_id, document)
    }

    /// Attach text the host decoded itself (e.g. from a DOCX).
    pub fn attach_text_document(
        &self,
        master_id: &str,
        file_name: &str,
        text: &str,
    ) -> Result<SessionState, CoreError> {
        let document = prepare_text_document(file_name, text, self.config.max_document_bytes)?;
        self.set_document(master_id, document)
    }

    /// The document cache is saved before the master, so a failed save
    /// leaves the master's extraction flags untouched.
    fn set_document(
        &self,
        master_id: &str,
        document: DocumentPayload,
    ) -> Result<SessionState, CoreError> {
        self.master(master_id)?;

        let previous = {
            let mut documents = self.write_documents()?;
            let previous = documents.insert(master_id.to_string(), document.clone());
            if let Err(e) = self.repository.save_documents(&documents) {
                restore_document(&mut documents, master_id, previous);
                return Err(e.into());
            }
            previous
        };

        let saved = {
            let mut masters = self.write_masters()?;
            let master = find_master_mut(&mut masters, master_id)?;
            let mut session = ExtractionSession::new(None, master.knowledge.clone());
            session.attach_document(document.clone());
            let knowledge = session.into_knowledge();
            let before = std::mem::replace(&mut master.knowledge, knowledge.clone());
            match self.repository.save_masters(&masters) {
                Ok(()) => Ok(knowledge),
                Err(e) => {
                    if let Ok(master) = find_master_mut(&mut masters, master_id) {
                        master.knowledge = before;
                    }
                    Err(e)
                }
            }
        };

        let knowledge = match saved {
            Ok(knowledge) => knowledge,
            Err(e) => {
                let mut documents = self.write_documents()?;
                restore_document(&mut documents, master_id, previous);
                if let Err(rollback) = self.repository.save_documents(&documents) {
                    tracing::warn!(master_id, error = %rollback, "Document cache rollback not saved");
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            master_id,
            document = %document.name,
            mime_type = %document.mime_type,
            bytes = document.decoded_len(),
            "Document attached"
        );
        Ok(ExtractionSession::new(Some(document), knowledge).state())
    }

    pub fn current_document(&self, master_id: &str) -> Result<Option<DocumentPayload>, CoreError> {
        self.master(master_id)?;
        Ok(self.read_documents()?.get(master_id).cloned())
    }

    pub fn clear_document(&self, master_id: &str) -> Result<(), CoreError> {
        self.master(master_id)?;
        let mut documents = self.write_documents()?;
        if documents.remove(master_id).is_some() {
            self.repository.save_documents(&documents)?;
        }
        Ok(())
    }

    pub fn session_state(&self, master_id: &str) -> Result<SessionState, CoreError> {
        let (document, knowledge) = self.snapshot(master_id)?;
        Ok(ExtractionSession::new(document, knowledge).state())
    }

    fn snapshot(
        &self,
        master_id: &str,
    ) -> Result<(Option<DocumentPayload>, Option<KnowledgeRecord>), CoreError> {
        let knowledge = {
            let masters = self.read_masters()?;
            find_master(&masters, master_id)?.knowledge.clone()
        };
        let document = self.read_documents()?.get(master_id).cloned();
        Ok((document, knowledge))
    }

    // ── Extraction ──────────────────────────────────────────

    /// Run one extraction round on the master's current document and store
    /// the merged knowledge.
    ///
    /// `continuing = false` treats the document as freshly attached (its
    /// earlier continuation flag is ignored); existing knowledge is still
    /// sent as prior knowledge either way.
    pub async fn run_extraction(
        &self,
        master_id: &str,
        continuing: bool,
    ) -> Result<KnowledgeRecord, CoreError> {
        let (document, knowledge) = self.snapshot(master_id)?;
        let mut session = match (document, continuing) {
            (Some(document), false) => {
                let mut session = ExtractionSession::new(None, knowledge);
                session.attach_document(document);
                session
            }
            (document, _) => ExtractionSession::new(document, knowledge),
        };

        tracing::info!(
            master_id,
            continuing,
            state = session.state().as_str(),
            "Starting extraction round"
        );

        let updated = match session.extract_next(&self.extractor).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(master_id, error = %e, "Extraction round failed");
                return Err(e.into());
            }
        };

        let mut masters = self.write_masters()?;
        let master = find_master_mut(&mut masters, master_id)?;
        master.knowledge = Some(updated.clone());
        self.repository.save_masters(&masters)?;

        Ok(updated)
    }

    // ── Fusion ──────────────────────────────────────────────

    /// Fuse the knowledge of the given masters. An empty id list fuses every
    /// master that has knowledge. Masters without knowledge are skipped.
    pub fn merge_masters(&self, master_ids: &[String]) -> Result<FusedKnowledge, CoreError> {
        let masters = self.read_masters()?;

        let selected: Vec<&Master> = if master_ids.is_empty() {
            masters.iter().collect()
        } else {
            let mut seen = HashSet::new();
            master_ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .map(|id| find_master(&masters, id))
                .collect::<Result<_, _>>()?
        };

        let (source_ids, records): (Vec<String>, Vec<&KnowledgeRecord>) = selected
            .into_iter()
            .filter_map(|m| m.knowledge.as_ref().map(|k| (m.id.clone(), k)))
            .unzip();

        let knowledge = fuse_knowledge(&records)?;
        Ok(FusedKnowledge {
            knowledge,
            suggested_name: fused_master_name(records.len()),
            source_ids,
        })
    }

    /// Fuse masters and add the result to the roster as a new master.
    pub fn create_fused_master(&self, master_ids: &[String]) -> Result<Master, CoreError> {
        let fused = self.merge_masters(master_ids)?;
        let master = Master::with_knowledge(fused.suggested_name, fused.knowledge);

        let mut masters = self.write_masters()?;
        masters.push(master.clone());
        self.repository.save_masters(&masters)?;

        tracing::info!(
            master_id = %master.id,
            sources = fused.source_ids.len(),
            "Fused master created"
        );
        Ok(master)
    }

    // ── Diagnosis & export ──────────────────────────────────

    pub async fn diagnose(&self, master_id: &str, query: &PatientQuery) -> Result<String, CoreError> {
        let knowledge = self.master(master_id)?.knowledge;
        let text = self.diagnosis.diagnose(knowledge.as_ref(), query).await?;
        Ok(text)
    }

    /// Pretty-printed JSON of the master's knowledge, with a download name.
    pub fn export_knowledge(&self, master_id: &str) -> Result<KnowledgeExport, CoreError> {
        let master = self.master(master_id)?;
        let knowledge = master
            .knowledge
            .as_ref()
            .ok_or_else(|| CoreError::NoKnowledge(master_id.to_string()))?;
        let json = serde_json::to_string_pretty(knowledge)
            .map_err(|e| CoreError::Export(e.to_string()))?;
        Ok(KnowledgeExport {
            file_name: master.export_file_name(),
            json,
        })
    }
}

fn restore_document(
    documents: &mut HashMap<String, DocumentPayload>,
    master_id: &str,
    previous: Option<DocumentPayload>,
) {
    match previous {
        Some(document) => {
            documents.insert(master_id.to_string(), document);
        }
        None => {
            documents.remove(master_id);
        }
    }
}

fn find_master<'a>(masters: &'a [Master], master_id: &str) -> Result<&'a Master, CoreError> {
    masters
        .iter()
        .find(|m| m.id == master_id)
        .ok_or_else(|| CoreError::MasterNotFound(master_id.to_string()))
}

fn find_master_mut<'a>(
    masters: &'a mut [Master],
    master_id: &str,
) -> Result<&'a mut Master, CoreError> {
    masters
        .iter_mut()
        .find(|m| m.id == master_id)
        .ok_or_else(|| CoreError::MasterNotFound(master_id.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Master not found: {0}")]
    MasterNotFound(String),
    #[error("At least one master must remain")]
    LastMaster,
    #[error("Master {0} has no extracted knowledge")]
    NoKnowledge(String),
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Diagnosis(#[from] DiagnosisError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Short message for display next to a retry/dismiss action.
    pub fn user_message(&self) -> String {
        match self {
            Self::MasterNotFound(_) => "找不到该泰斗。".to_string(),
            Self::LastMaster => "至少需要保留一位泰斗。".to_string(),
            Self::NoKnowledge(_) => "该泰斗尚未提取知识。".to_string(),
            Self::LockPoisoned => "内部状态错误，请重启应用。".to_string(),
            Self::Export(_) => "导出失败，请重试。".to_string(),
            Self::Ingest(e) => e.user_message(),
            Self::Extraction(e) => e.user_message().to_string(),
            Self::Merge(e) => e.user_message().to_string(),
            Self::Diagnosis(e) => e.user_message().to_string(),
            Self::Llm(e) => e.user_message().to_string(),
            Self::Store(e) => e.user_message().to_string(),
        }
    }
}
