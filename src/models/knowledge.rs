use serde::{Deserialize, Serialize};

/// Diagnostic knowledge accumulated for one master across extraction rounds.
///
/// `disease_classifications` and `master_thoughts` behave as insertion-ordered
/// sets: the merge engine never lets a duplicate string in. `symptom_mappings`
/// is append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecord {
    #[serde(default)]
    pub disease_classifications: Vec<String>,
    #[serde(default)]
    pub symptom_mappings: Vec<SymptomMapping>,
    #[serde(default)]
    pub master_thoughts: Vec<String>,
    /// `None` until a round has reported whether the source has more to give.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more_content: Option<bool>,
}

/// One symptom/sign cluster mapped to its syndrome and treatment.
///
/// Missing values are empty strings or empty lists, never absent fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomMapping {
    pub disease: String,
    pub symptoms: Vec<String>,
    pub tongue: String,
    pub pulse: String,
    pub syndrome: String,
    pub treatment_principle: String,
    pub prescription: String,
    pub modifications: Vec<String>,
    pub associated_thoughts: Vec<String>,
}

/// The normalized output of a single extraction round, before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBatch {
    pub disease_classifications: Vec<String>,
    pub symptom_mappings: Vec<SymptomMapping>,
    pub master_thoughts: Vec<String>,
    pub has_more_content: bool,
}

impl KnowledgeBatch {
    /// A batch that adds nothing and reports the source as exhausted.
    ///
    /// Merging it into prior knowledge leaves everything unchanged except
    /// `has_more_content`, which becomes `Some(false)`.
    pub fn exhausted() -> Self {
        Self::default()
    }

    /// True when none of the three content lists has an entry.
    pub fn is_empty(&self) -> bool {
        self.disease_classifications.is_empty()
            && self.symptom_mappings.is_empty()
            && self.master_thoughts.is_empty()
    }
}

impl From<KnowledgeRecord> for KnowledgeBatch {
    fn from(record: KnowledgeRecord) -> Self {
        Self {
            disease_classifications: record.disease_classifications,
            symptom_mappings: record.symptom_mappings,
            master_thoughts: record.master_thoughts,
            has_more_content: record.has_more_content.unwrap_or(false),
        }
    }
}

impl KnowledgeRecord {
    /// Syndrome names of every mapping, in order. Used to tell the model what
    /// it has already covered.
    pub fn syndromes(&self) -> Vec<&str> {
        self.symptom_mappings
            .iter()
            .map(|m| m.syndrome.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.disease_classifications.is_empty()
            && self.symptom_mappings.is_empty()
            && self.master_thoughts.is_empty()
    }

    pub fn summary(&self) -> KnowledgeSummary {
        KnowledgeSummary {
            disease_count: self.disease_classifications.len(),
            mapping_count: self.symptom_mappings.len(),
            thought_count: self.master_thoughts.len(),
            scope_preview: self
                .disease_classifications
                .iter()
                .take(SCOPE_PREVIEW_LEN)
                .cloned()
                .collect(),
            scope_truncated: self.disease_classifications.len() > SCOPE_PREVIEW_LEN,
            has_more_content: self.has_more_content,
        }
    }
}

const SCOPE_PREVIEW_LEN: usize = 3;

/// Display-oriented digest of a knowledge record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSummary {
    pub disease_count: usize,
    pub mapping_count: usize,
    pub thought_count: usize,
    /// First few disease names, for a "knowledge scope" header.
    pub scope_preview: Vec<String>,
    pub scope_truncated: bool,
    pub has_more_content: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mapping() -> SymptomMapping {
        SymptomMapping {
            disease: "外感发热".into(),
            symptoms: vec!["发热".into(), "恶寒".into()],
            tongue: "舌淡".into(),
            pulse: "浮紧".into(),
            syndrome: "风寒束表".into(),
            treatment_principle: "辛温解表".into(),
            prescription: "麻黄汤".into(),
            modifications: vec![],
            associated_thoughts: vec![],
        }
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let record = KnowledgeRecord {
            disease_classifications: vec!["外感发热".into()],
            symptom_mappings: vec![sample_mapping()],
            master_thoughts: vec!["表证宜汗".into()],
            has_more_content: Some(false),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("diseaseClassifications").is_some());
        assert!(json.get("masterThoughts").is_some());
        assert_eq!(json["hasMoreContent"], false);
        assert_eq!(json["symptomMappings"][0]["treatmentPrinciple"], "辛温解表");
        assert_eq!(json["symptomMappings"][0]["associatedThoughts"], serde_json::json!([]));
    }

    #[test]
    fn unknown_continuation_flag_is_omitted() {
        let record = KnowledgeRecord::default();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("hasMoreContent").is_none());
    }

    #[test]
    fn mapping_fills_missing_fields_with_empty_values() {
        let mapping: SymptomMapping =
            serde_json::from_str(r#"{"syndrome": "脾虚湿困"}"#).unwrap();
        assert_eq!(mapping.syndrome, "脾虚湿困");
        assert_eq!(mapping.tongue, "");
        assert!(mapping.symptoms.is_empty());
    }

    #[test]
    fn record_without_flag_loads_as_undetermined() {
        // Fused records are persisted without a continuation flag.
        let record: KnowledgeRecord = serde_json::from_str(
            r#"{"diseaseClassifications": ["痹证"], "symptomMappings": [], "masterThoughts": []}"#,
        )
        .unwrap();
        assert_eq!(record.has_more_content, None);
        assert_eq!(record.disease_classifications, vec!["痹证"]);
    }

    #[test]
    fn exhausted_batch_is_empty_and_final() {
        let batch = KnowledgeBatch::exhausted();
        assert!(batch.is_empty());
        assert!(!batch.has_more_content);
    }

    #[test]
    fn summary_previews_first_three_diseases() {
        let record = KnowledgeRecord {
            disease_classifications: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            symptom_mappings: vec![sample_mapping()],
            master_thoughts: vec![],
            has_more_content: Some(true),
        };
        let summary = record.summary();
        assert_eq!(summary.disease_count, 4);
        assert_eq!(summary.mapping_count, 1);
        assert_eq!(summary.scope_preview, vec!["a", "b", "c"]);
        assert!(summary.scope_truncated);
    }

    #[test]
    fn syndromes_follow_mapping_order() {
        let mut second = sample_mapping();
        second.syndrome = "肝郁气滞".into();
        let record = KnowledgeRecord {
            symptom_mappings: vec![sample_mapping(), second],
            ..Default::default()
        };
        assert_eq!(record.syndromes(), vec!["风寒束表", "肝郁气滞"]);
    }
}
