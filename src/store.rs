//! Persistence of the master roster and the per-master document cache.
//!
//! Storage sits behind `StateRepository`; the core hands it complete
//! snapshots and never edits files in place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::models::{DocumentPayload, Master};

const MASTERS_FILE: &str = "masters.json";
const DOCUMENTS_FILE: &str = "documents.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted state file {file}: {source}")]
    Corrupted {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Corrupted { .. } => "本地保存的数据已损坏，无法读取。",
            _ => "保存数据失败，请检查磁盘空间或权限。",
        }
    }
}

/// Load/save interface for application state. Saves replace the whole
/// snapshot.
pub trait StateRepository: Send + Sync {
    fn load_masters(&self) -> Result<Vec<Master>, StoreError>;
    fn save_masters(&self, masters: &[Master]) -> Result<(), StoreError>;
    fn load_documents(&self) -> Result<HashMap<String, DocumentPayload>, StoreError>;
    fn save_documents(&self, documents: &HashMap<String, DocumentPayload>) -> Result<(), StoreError>;
}

/// Pretty-printed JSON files in one directory.
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json<T: serde::de::DeserializeOwned + Default>(
        &self,
        file: &str,
    ) -> Result<T, StoreError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupted {
            file: file.to_string(),
            source,
        })
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value).map_err(StoreError::Serialize)?;
        std::fs::write(self.dir.join(file), json)?;
        Ok(())
    }
}

impl StateRepository for JsonFileRepository {
    fn load_masters(&self) -> Result<Vec<Master>, StoreError> {
        self.read_json(MASTERS_FILE)
    }

    fn save_masters(&self, masters: &[Master]) -> Result<(), StoreError> {
        self.write_json(MASTERS_FILE, masters)
    }

    fn load_documents(&self) -> Result<HashMap<String, DocumentPayload>, StoreError> {
        self.read_json(DOCUMENTS_FILE)
    }

    fn save_documents(&self, documents: &HashMap<String, DocumentPayload>) -> Result<(), StoreError> {
        self.write_json(DOCUMENTS_FILE, documents)
    }
}

/// Keeps state in memory only. For tests and hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryRepository {
    masters: Mutex<Vec<Master>>,
    documents: Mutex<HashMap<String, DocumentPayload>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_masters(masters: Vec<Master>) -> Self {
        Self {
            masters: Mutex::new(masters),
            documents: Mutex::default(),
        }
    }
}

impl StateRepository for MemoryRepository {
    fn load_masters(&self) -> Result<Vec<Master>, StoreError> {
        self.masters
            .lock()
            .map(|m| m.clone())
            .map_err(|_| StoreError::LockPoisoned)
    }

    fn save_masters(&self, masters: &[Master]) -> Result<(), StoreError> {
        let mut guard = self.masters.lock().map_err(|_| StoreError::LockPoisoned)?;
        *guard = masters.to_vec();
        Ok(())
    }

    fn load_documents(&self) -> Result<HashMap<String, DocumentPayload>, StoreError> {
        self.documents
            .lock()
            .map(|d| d.clone())
            .map_err(|_| StoreError::LockPoisoned)
    }

    fn save_documents(&self, documents: &HashMap<String, DocumentPayload>) -> Result<(), StoreError> {
        let mut guard = self.documents.lock().map_err(|_| StoreError::LockPoisoned)?;
        *guard = documents.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeRecord;

    fn masters() -> Vec<Master> {
        vec![
            Master::new("泰斗 1"),
            Master::with_knowledge(
                "泰斗 2",
                KnowledgeRecord {
                    disease_classifications: vec!["外感发热".into()],
                    has_more_content: Some(true),
                    ..Default::default()
                },
            ),
        ]
    }

    #[test]
    fn missing_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        assert!(repo.load_masters().unwrap().is_empty());
        assert!(repo.load_documents().unwrap().is_empty());
    }

    #[test]
    fn masters_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested"));
        let saved = masters();
        repo.save_masters(&saved).unwrap();

        let reopened = JsonFileRepository::new(dir.path().join("nested"));
        assert_eq!(reopened.load_masters().unwrap(), saved);
    }

    #[test]
    fn documents_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        let mut documents = HashMap::new();
        documents.insert(
            "m1".to_string(),
            DocumentPayload::from_bytes_unchecked("医案.txt", "内容".as_bytes(), "text/plain"),
        );
        repo.save_documents(&documents).unwrap();
        assert_eq!(repo.load_documents().unwrap(), documents);
    }

    #[test]
    fn masters_file_uses_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        repo.save_masters(&masters()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join(MASTERS_FILE)).unwrap();
        assert!(raw.contains("\"diseaseClassifications\""));
        assert!(raw.contains("\"hasMoreContent\": true"));
    }

    #[test]
    fn corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MASTERS_FILE), "{not json").unwrap();
        let repo = JsonFileRepository::new(dir.path());
        assert!(matches!(
            repo.load_masters(),
            Err(StoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn memory_repository_round_trips() {
        let repo = MemoryRepository::new();
        repo.save_masters(&masters()).unwrap();
        assert_eq!(repo.load_masters().unwrap().len(), 2);
    }
}
