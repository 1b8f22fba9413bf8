//! Knowledge merging: folding a batch into a master's record, and fusing
//! several masters into one.

use std::collections::HashSet;

use thiserror::Error;

use crate::models::{KnowledgeBatch, KnowledgeRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("Fusion needs at least 2 knowledge records, found {found}")]
    InsufficientSources { found: usize },
}

impl MergeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InsufficientSources { .. } => "至少需要两位已提取知识的泰斗才能进行融合。",
        }
    }
}

/// Fold one extraction batch into `base`.
///
/// Diseases and thoughts are an ordered union (new strings appended, exact
/// duplicates skipped). Mappings are appended as-is. The continuation flag
/// always comes from the batch.
pub fn merge(base: &KnowledgeRecord, incoming: &KnowledgeBatch) -> KnowledgeRecord {
    let mut merged = base.clone();
    let added_diseases = union_into(
        &mut merged.disease_classifications,
        &incoming.disease_classifications,
    );
    let added_thoughts = union_into(&mut merged.master_thoughts, &incoming.master_thoughts);
    merged
        .symptom_mappings
        .extend(incoming.symptom_mappings.iter().cloned());
    merged.has_more_content = Some(incoming.has_more_content);

    tracing::debug!(
        added_diseases,
        added_mappings = incoming.symptom_mappings.len(),
        added_thoughts,
        has_more_content = incoming.has_more_content,
        "Merged batch into knowledge"
    );

    merged
}

/// Fuse two or more masters' knowledge into one record.
///
/// Sources are folded left to right with the same rules as [`merge`]. The
/// result describes no single document, so its continuation flag is unset.
pub fn fuse_knowledge(sources: &[&KnowledgeRecord]) -> Result<KnowledgeRecord, MergeError> {
    if sources.len() < 2 {
        return Err(MergeError::InsufficientSources {
            found: sources.len(),
        });
    }

    let mut fused = KnowledgeRecord::default();
    for source in sources {
        union_into(
            &mut fused.disease_classifications,
            &source.disease_classifications,
        );
        union_into(&mut fused.master_thoughts, &source.master_thoughts);
        fused
            .symptom_mappings
            .extend(source.symptom_mappings.iter().cloned());
    }

    tracing::info!(
        sources = sources.len(),
        diseases = fused.disease_classifications.len(),
        mappings = fused.symptom_mappings.len(),
        thoughts = fused.master_thoughts.len(),
        "Fused master knowledge"
    );

    Ok(fused)
}

/// Append items from `incoming` that are not already in `target`; returns
/// how many were added.
fn union_into(target: &mut Vec<String>, incoming: &[String]) -> usize {
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    let before = target.len();
    for item in incoming {
        if seen.insert(item.clone()) {
            target.push(item.clone());
        }
    }
    target.len() - before
}
