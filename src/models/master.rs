use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::knowledge::KnowledgeRecord;

/// Display-name prefix for masters created by the user.
pub const MASTER_NAME_PREFIX: &str = "泰斗";

/// Display-name prefix for masters synthesized by fusion.
pub const FUSED_MASTER_NAME_PREFIX: &str = "融合泰斗";

/// A named simulated practitioner backed by accumulated knowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Master {
    pub id: String,
    pub name: String,
    /// `None` until an extraction round or a fusion has succeeded.
    pub knowledge: Option<KnowledgeRecord>,
}

impl Master {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_master_id(),
            name: name.into(),
            knowledge: None,
        }
    }

    pub fn with_knowledge(name: impl Into<String>, knowledge: KnowledgeRecord) -> Self {
        Self {
            id: new_master_id(),
            name: name.into(),
            knowledge: Some(knowledge),
        }
    }

    pub fn has_knowledge(&self) -> bool {
        self.knowledge.is_some()
    }

    /// File name used when exporting this master's knowledge as JSON.
    pub fn export_file_name(&self) -> String {
        let slug = self
            .name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        format!("{slug}-agent.json")
    }
}

/// Opaque, unique master id.
pub fn new_master_id() -> String {
    Uuid::new_v4().to_string()
}

/// Name for the next master in a roster of `existing` masters.
pub fn next_master_name(existing: usize) -> String {
    format!("{MASTER_NAME_PREFIX} {}", existing + 1)
}

/// Name suggested for a master fused from `source_count` masters.
pub fn fused_master_name(source_count: usize) -> String {
    format!("{FUSED_MASTER_NAME_PREFIX} ({source_count})")
}

/// The roster a fresh installation starts with: exactly one empty master.
pub fn default_roster() -> Vec<Master> {
    vec![Master::new(next_master_name(0))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_master_has_no_knowledge() {
        let master = Master::new("泰斗 1");
        assert!(!master.has_knowledge());
        assert!(!master.id.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Master::new("a").id, Master::new("a").id);
    }

    #[test]
    fn default_roster_has_one_master() {
        let roster = default_roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "泰斗 1");
    }

    #[test]
    fn naming_helpers() {
        assert_eq!(next_master_name(2), "泰斗 3");
        assert_eq!(fused_master_name(2), "融合泰斗 (2)");
    }

    #[test]
    fn export_file_name_slugs_whitespace() {
        let master = Master::new("Zhang  Zhong Jing");
        assert_eq!(master.export_file_name(), "zhang-zhong-jing-agent.json");
        let master = Master::new("泰斗 1");
        assert_eq!(master.export_file_name(), "泰斗-1-agent.json");
    }

    #[test]
    fn loads_legacy_roster_json() {
        let masters: Vec<Master> =
            serde_json::from_str(r#"[{"id": "1", "name": "泰斗 1", "knowledge": null}]"#).unwrap();
        assert_eq!(masters[0].id, "1");
        assert!(masters[0].knowledge.is_none());
    }
}
