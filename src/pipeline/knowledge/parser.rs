use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::ExtractionError;
use crate::models::{KnowledgeBatch, SymptomMapping};

static OPENING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?[ \t]*\r?\n?").expect("valid regex"));
static CLOSING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```$").expect("valid regex"));

/// Remove a markdown code fence (```` ```json ```` or bare ```` ``` ````) wrapping
/// the whole response. Text without a leading fence is returned trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text;
    }
    let start = OPENING_FENCE_RE.find(text).map(|m| m.end()).unwrap_or(0);
    let inner = &text[start..];
    let end = CLOSING_FENCE_RE
        .find(inner)
        .map(|m| m.start())
        .unwrap_or(inner.len());
    inner[..end].trim()
}

/// Parse and normalize the model's answer for one extraction round.
///
/// Fails only when there is no text or the text is not a JSON object.
/// Field-level problems are repaired: non-array fields become empty,
/// blank or mistyped elements are dropped, a missing flag reads as `false`.
pub fn parse_knowledge_response(raw: &str) -> Result<KnowledgeBatch, ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let text = strip_code_fences(raw);
    let value: Value = serde_json::from_str(text).map_err(|e| {
        if e.is_eof() {
            ExtractionError::MalformedResponse(format!("response truncated: {e}"))
        } else {
            ExtractionError::MalformedResponse(e.to_string())
        }
    })?;

    let object = value.as_object().ok_or_else(|| {
        ExtractionError::MalformedResponse("expected a JSON object at the top level".into())
    })?;

    let batch = KnowledgeBatch {
        disease_classifications: string_list(object.get("diseaseClassifications")),
        symptom_mappings: mapping_list(object.get("symptomMappings")),
        master_thoughts: string_list(object.get("masterThoughts")),
        has_more_content: object
            .get("hasMoreContent")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    tracing::debug!(
        diseases = batch.disease_classifications.len(),
        mappings = batch.symptom_mappings.len(),
        thoughts = batch.master_thoughts.len(),
        has_more_content = batch.has_more_content,
        "Parsed extraction batch"
    );

    Ok(batch)
}

/// Non-blank strings of an array field; anything else yields an empty list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    let kept: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .collect();
    if kept.len() < items.len() {
        tracing::debug!(dropped = items.len() - kept.len(), "Dropped empty or non-string items");
    }
    kept
}

fn mapping_list(value: Option<&Value>) -> Vec<SymptomMapping> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items.iter().filter_map(mapping_from_value).collect()
}

/// Lenient mapping conversion: only non-objects are rejected; missing or
/// mistyped fields become empty values.
fn mapping_from_value(value: &Value) -> Option<SymptomMapping> {
    let object = value.as_object()?;
    let text = |key: &str| match object.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let list = |key: &str| string_list(object.get(key));

    Some(SymptomMapping {
        disease: text("disease"),
        symptoms: list("symptoms"),
        tongue: text("tongue"),
        pulse: text("pulse"),
        syndrome: text("syndrome"),
        treatment_principle: text("treatmentPrinciple"),
        prescription: text("prescription"),
        modifications: list("modifications"),
        associated_thoughts: list("associatedThoughts"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a_json() -> &'static str {
        r#"{
  "diseaseClassifications": ["外感发热"],
  "symptomMappings": [
    {
      "disease": "外感发热",
      "symptoms": ["发热", "恶寒"],
      "tongue": "舌淡",
      "pulse": "浮紧",
      "syndrome": "风寒束表",
      "treatmentPrinciple": "辛温解表",
      "prescription": "麻黄汤",
      "modifications": [],
      "associatedThoughts": []
    }
  ],
  "masterThoughts": ["表证宜汗"],
  "hasMoreContent": false
}"#
    }

    #[test]
    fn parses_plain_json() {
        let batch = parse_knowledge_response(scenario_a_json()).unwrap();
        assert_eq!(batch.disease_classifications, vec!["外感发热"]);
        assert_eq!(batch.symptom_mappings.len(), 1);
        let mapping = &batch.symptom_mappings[0];
        assert_eq!(mapping.symptoms, vec!["发热", "恶寒"]);
        assert_eq!(mapping.pulse, "浮紧");
        assert_eq!(mapping.treatment_principle, "辛温解表");
        assert_eq!(mapping.prescription, "麻黄汤");
        assert_eq!(batch.master_thoughts, vec!["表证宜汗"]);
        assert!(!batch.has_more_content);
    }

    #[test]
    fn json_fence_parses_like_inner_text() {
        let fenced = format!("```json\n{}\n```", scenario_a_json());
        assert_eq!(
            parse_knowledge_response(&fenced).unwrap(),
            parse_knowledge_response(scenario_a_json()).unwrap()
        );
    }

    #[test]
    fn bare_fence_parses_like_inner_text() {
        let fenced = format!("```\n{}\n```", scenario_a_json());
        assert_eq!(
            parse_knowledge_response(&fenced).unwrap(),
            parse_knowledge_response(scenario_a_json()).unwrap()
        );
    }

    #[test]
    fn strip_code_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  ```json{}```  "), "{}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        // Unclosed fence: the opening is still removed.
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn empty_text_is_empty_response() {
        assert_eq!(parse_knowledge_response(""), Err(ExtractionError::EmptyResponse));
        assert_eq!(parse_knowledge_response("  \n "), Err(ExtractionError::EmptyResponse));
    }

    #[test]
    fn non_json_is_malformed() {
        let result = parse_knowledge_response("以下是提取结果：外感发热");
        assert!(matches!(result, Err(ExtractionError::MalformedResponse(_))));
    }

    #[test]
    fn truncated_json_is_malformed() {
        let result = parse_knowledge_response(r#"{"diseaseClassifications": ["外感发热", "脾"#);
        match result {
            Err(ExtractionError::MalformedResponse(msg)) => assert!(msg.contains("truncated")),
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[test]
    fn top_level_array_is_malformed() {
        let result = parse_knowledge_response(r#"["外感发热"]"#);
        assert!(matches!(result, Err(ExtractionError::MalformedResponse(_))));
    }

    #[test]
    fn non_array_fields_become_empty() {
        let batch = parse_knowledge_response(
            r#"{"diseaseClassifications": "外感发热", "symptomMappings": null, "masterThoughts": {"a": 1}, "hasMoreContent": true}"#,
        )
        .unwrap();
        assert!(batch.is_empty());
        assert!(batch.has_more_content);
    }

    #[test]
    fn falsy_elements_are_dropped() {
        let batch = parse_knowledge_response(
            r#"{"diseaseClassifications": ["外感发热", "", null, "  ", 0, "脾胃病"],
                "symptomMappings": [null, false, {"syndrome": "脾虚"}],
                "masterThoughts": [null, "表证宜汗"]}"#,
        )
        .unwrap();
        assert_eq!(batch.disease_classifications, vec!["外感发热", "脾胃病"]);
        assert_eq!(batch.symptom_mappings.len(), 1);
        assert_eq!(batch.symptom_mappings[0].syndrome, "脾虚");
        assert_eq!(batch.master_thoughts, vec!["表证宜汗"]);
    }

    #[test]
    fn missing_flag_defaults_to_false() {
        let batch = parse_knowledge_response(r#"{"diseaseClassifications": ["痹证"]}"#).unwrap();
        assert!(!batch.has_more_content);
        assert!(batch.symptom_mappings.is_empty());
    }

    #[test]
    fn mapping_fields_are_never_missing() {
        let batch = parse_knowledge_response(
            r#"{"symptomMappings": [{"disease": "消渴", "symptoms": ["口渴", ""], "modifications": "加黄连"}]}"#,
        )
        .unwrap();
        let mapping = &batch.symptom_mappings[0];
        assert_eq!(mapping.disease, "消渴");
        assert_eq!(mapping.symptoms, vec!["口渴"]);
        assert_eq!(mapping.tongue, "");
        assert!(mapping.modifications.is_empty());
        assert!(mapping.associated_thoughts.is_empty());
    }
}
