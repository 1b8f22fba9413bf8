use serde_json::json;

use crate::config::BatchLimits;
use crate::models::{DocumentPayload, KnowledgeRecord};
use crate::pipeline::llm::{ContentPart, GenerateRequest};

/// Build the instruction block for one extraction round.
///
/// With `prior`, the prompt lists what was already extracted and asks for new
/// items only. The model may still repeat itself; the merge engine dedups.
pub fn build_extraction_prompt(limits: &BatchLimits, prior: Option<&KnowledgeRecord>) -> String {
    let BatchLimits {
        max_diseases,
        max_mappings,
        max_thoughts,
    } = *limits;

    let mut prompt = format!(
        r#"You are an expert in Traditional Chinese Medicine (TCM).
Analyze the provided document (a TCM text or case study collection from a master).
Extract the following structured knowledge.

CRITICAL INSTRUCTION: To prevent output truncation, you MUST extract only a BATCH of information in this turn:
1. Disease Classifications: Extract up to {max_diseases} disease classifications (e.g., 外感发热, 脾胃病).
2. Master's Thoughts: Extract up to {max_thoughts} unique diagnostic thoughts, principles, or rules from this specific master.
3. Symptom Mappings: Extract up to {max_mappings} detailed mappings. FOR EACH MAPPING, you MUST establish clear relationships:
   - "disease": Specify which disease from the 'Disease Classifications' this mapping belongs to.
   - "associatedThoughts": Provide an array of strings referencing the 'Master's Thoughts' that apply to this specific mapping.
   - Include symptoms, tongue appearance, pulse, the corresponding syndrome (证型), treatment principle (治法), base prescription (方剂), and specific modifications based on symptoms (加减).
4. hasMoreContent: A boolean flag. Set to true if there is STILL MORE relevant TCM knowledge in the document that you haven't extracted yet due to the batch limit. Set to false if you have extracted ALL relevant knowledge from the document.

Return the output strictly as JSON matching the requested schema. Ensure the extracted data is highly detailed and specific to the text provided, not just generic TCM knowledge.
"#
    );

    if let Some(prior) = prior {
        prompt.push_str(&format!(
            r#"
IMPORTANT: You have already extracted some knowledge from this master.
DO NOT repeat the following previously extracted knowledge. Focus ONLY on finding NEW disease classifications, symptom mappings, and master's thoughts that are NOT in this list:

Previously Extracted Disease Classifications: {diseases}
Previously Extracted Symptom Mappings (Syndromes): {syndromes}
Previously Extracted Master's Thoughts: {thoughts}

Extract a NEW BATCH of up to {max_diseases} disease classifications, {max_mappings} symptom mappings, and {max_thoughts} master's thoughts from the document that haven't been covered yet. Ensure the new symptom mappings clearly link to either new or previously extracted diseases and thoughts.
"#,
            diseases = json_list(&prior.disease_classifications),
            syndromes = json_list(&prior.syndromes()),
            thoughts = json_list(&prior.master_thoughts),
        ));
    }

    prompt
}

fn json_list<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Structured-output schema: all four top-level fields are required, and so is
/// every field of a mapping.
pub fn knowledge_response_schema() -> serde_json::Value {
    let string_array = json!({ "type": "ARRAY", "items": { "type": "STRING" } });

    json!({
        "type": "OBJECT",
        "properties": {
            "diseaseClassifications": string_array,
            "symptomMappings": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "disease": { "type": "STRING" },
                        "symptoms": string_array,
                        "tongue": { "type": "STRING" },
                        "pulse": { "type": "STRING" },
                        "syndrome": { "type": "STRING" },
                        "treatmentPrinciple": { "type": "STRING" },
                        "prescription": { "type": "STRING" },
                        "modifications": string_array,
                        "associatedThoughts": string_array
                    },
                    "required": [
                        "disease", "symptoms", "tongue", "pulse", "syndrome",
                        "treatmentPrinciple", "prescription", "modifications",
                        "associatedThoughts"
                    ]
                }
            },
            "masterThoughts": string_array,
            "hasMoreContent": { "type": "BOOLEAN" }
        },
        "required": [
            "diseaseClassifications", "symptomMappings", "masterThoughts", "hasMoreContent"
        ]
    })
}

/// Full model request for one round: document first, then instructions.
pub fn build_extraction_request(
    document: &DocumentPayload,
    limits: &BatchLimits,
    prior: Option<&KnowledgeRecord>,
) -> GenerateRequest {
    GenerateRequest {
        parts: vec![
            ContentPart::InlineData {
                mime_type: document.mime_type.clone(),
                data: document.payload.clone(),
            },
            ContentPart::Text(build_extraction_prompt(limits, prior)),
        ],
        ..Default::default()
    }
    .with_response_schema(knowledge_response_schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SymptomMapping;

    fn prior() -> KnowledgeRecord {
        KnowledgeRecord {
            disease_classifications: vec!["外感发热".into()],
            symptom_mappings: vec![SymptomMapping {
                syndrome: "风寒束表".into(),
                ..Default::default()
            }],
            master_thoughts: vec!["表证宜汗".into()],
            has_more_content: Some(true),
        }
    }

    #[test]
    fn first_round_prompt_states_ceilings() {
        let prompt = build_extraction_prompt(&BatchLimits::default(), None);
        assert!(prompt.contains("up to 15 disease classifications"));
        assert!(prompt.contains("up to 10 detailed mappings"));
        assert!(prompt.contains("up to 10 unique diagnostic thoughts"));
        assert!(prompt.contains("hasMoreContent"));
        assert!(!prompt.contains("Previously Extracted"));
    }

    #[test]
    fn custom_limits_are_used() {
        let limits = BatchLimits {
            max_diseases: 5,
            max_mappings: 3,
            max_thoughts: 2,
        };
        let prompt = build_extraction_prompt(&limits, Some(&prior()));
        assert!(prompt.contains("up to 5 disease classifications"));
        assert!(prompt.contains("NEW BATCH of up to 5 disease classifications, 3 symptom mappings, and 2 master's thoughts"));
    }

    #[test]
    fn continuation_prompt_enumerates_prior_knowledge() {
        let prompt = build_extraction_prompt(&BatchLimits::default(), Some(&prior()));
        assert!(prompt.contains(r#"Previously Extracted Disease Classifications: ["外感发热"]"#));
        assert!(prompt.contains(r#"Previously Extracted Symptom Mappings (Syndromes): ["风寒束表"]"#));
        assert!(prompt.contains(r#"Previously Extracted Master's Thoughts: ["表证宜汗"]"#));
        assert!(prompt.contains("DO NOT repeat"));
    }

    #[test]
    fn schema_requires_all_top_level_fields() {
        let schema = knowledge_response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(
            required,
            vec!["diseaseClassifications", "symptomMappings", "masterThoughts", "hasMoreContent"]
        );
        assert_eq!(schema["properties"]["hasMoreContent"]["type"], "BOOLEAN");
        assert_eq!(
            schema["properties"]["symptomMappings"]["items"]["required"]
                .as_array()
                .unwrap()
                .len(),
            9
        );
    }

    #[test]
    fn request_puts_document_before_instructions() {
        let doc = DocumentPayload::from_bytes_unchecked("a.pdf", b"%PDF", "application/pdf");
        let request = build_extraction_request(&doc, &BatchLimits::default(), None);
        assert!(matches!(
            &request.parts[0],
            ContentPart::InlineData { mime_type, .. } if mime_type == "application/pdf"
        ));
        assert!(matches!(&request.parts[1], ContentPart::Text(_)));
        assert_eq!(request.response_schema, Some(knowledge_response_schema()));
        assert!(request.system_instruction.is_none());
    }
}
