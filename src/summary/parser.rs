//! Lenient parsing of the model's fenced-JSON response.
//!
//! The collaborator contract: missing or mistyped fields become safe
//! defaults. A parsing failure is a `SummaryError` for the caller to absorb
//! into a placeholder summary; it never escapes the summary boundary.

use serde_json::Value;

use super::types::{DocumentSummary, Relevance};
use super::SummaryError;
use crate::portal::types::DocumentDescriptor;

/// Parse the model response into a summary, tolerating schema drift.
pub fn parse_summary_response(
    response: &str,
    descriptor: &DocumentDescriptor,
) -> Result<DocumentSummary, SummaryError> {
    let json_str = extract_json_block(response)?;
    let value: Value =
        serde_json::from_str(&json_str).map_err(|e| SummaryError::JsonParsing(e.to_string()))?;

    Ok(DocumentSummary {
        doc_type: descriptor.doc_type.clone(),
        date: descriptor.date.clone(),
        site_context: string_field(&value, "site_context"),
        contaminants: string_list(&value, "contaminants"),
        media: string_list(&value, "media"),
        actions: string_field(&value, "actions"),
        relevance: Relevance::parse_lenient(&string_field(&value, "relevance")),
        narrative: string_field(&value, "narrative"),
        error: None,
    })
}

/// Pull the JSON out of a ```json fence, or accept a bare object when the
/// model skipped the fence entirely.
fn extract_json_block(response: &str) -> Result<String, SummaryError> {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        let end = response[content_start..]
            .find("```")
            .ok_or_else(|| SummaryError::MalformedResponse("Unclosed JSON fence".into()))?;
        return Ok(response[content_start..content_start + end].trim().to_string());
    }
    // No fence: look for the outermost object.
    let start = response
        .find('{')
        .ok_or_else(|| SummaryError::MalformedResponse("No JSON object found".into()))?;
    let end = response
        .rfind('}')
        .ok_or_else(|| SummaryError::MalformedResponse("No JSON object found".into()))?;
    if end < start {
        return Err(SummaryError::MalformedResponse("No JSON object found".into()));
    }
    Ok(response[start..=end].to_string())
}

/// String field with a blank default. Numbers and bools are stringified
/// rather than rejected.
fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// String-array field, skipping non-string items, tolerating a lone string.
fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor {
            id: 3,
            doc_type: "Monitoring Report".to_string(),
            date: "11/30/2012".to_string(),
            row_index: 3,
        }
    }

    #[test]
    fn full_response_parses() {
        let response = r#"Here is the summary:

```json
{
  "site_context": "Former plating facility",
  "contaminants": ["chromium", "TCE"],
  "media": ["groundwater", "soil"],
  "actions": "Quarterly monitoring ordered",
  "relevance": "relevant",
  "narrative": "The report documents exceedances in three wells."
}
```"#;
        let summary = parse_summary_response(response, &descriptor()).unwrap();
        assert_eq!(summary.site_context, "Former plating facility");
        assert_eq!(summary.contaminants, vec!["chromium", "TCE"]);
        assert_eq!(summary.media, vec!["groundwater", "soil"]);
        assert_eq!(summary.relevance, Relevance::Relevant);
        assert_eq!(summary.doc_type, "Monitoring Report");
        assert!(summary.error.is_none());
    }

    #[test]
    fn missing_fields_become_defaults() {
        let response = "```json\n{\"narrative\": \"brief\"}\n```";
        let summary = parse_summary_response(response, &descriptor()).unwrap();
        assert_eq!(summary.narrative, "brief");
        assert_eq!(summary.site_context, "");
        assert!(summary.contaminants.is_empty());
        assert_eq!(summary.relevance, Relevance::Maybe);
    }

    #[test]
    fn mistyped_fields_are_tolerated() {
        let response = r#"```json
{
  "site_context": 42,
  "contaminants": "lead",
  "media": [1, "soil", null],
  "relevance": ["relevant"],
  "narrative": true
}
```"#;
        let summary = parse_summary_response(response, &descriptor()).unwrap();
        assert_eq!(summary.site_context, "42");
        assert_eq!(summary.contaminants, vec!["lead"]);
        assert_eq!(summary.media, vec!["soil"]);
        // A non-string relevance falls through to Maybe.
        assert_eq!(summary.relevance, Relevance::Maybe);
        assert_eq!(summary.narrative, "true");
    }

    #[test]
    fn bare_object_without_fence_parses() {
        let response = r#"{"narrative": "no fence", "relevance": "not relevant"}"#;
        let summary = parse_summary_response(response, &descriptor()).unwrap();
        assert_eq!(summary.narrative, "no fence");
        assert_eq!(summary.relevance, Relevance::NotRelevant);
    }

    #[test]
    fn unclosed_fence_is_malformed() {
        let response = "```json\n{\"narrative\": \"oops\"";
        assert!(matches!(
            parse_summary_response(response, &descriptor()),
            Err(SummaryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(matches!(
            parse_summary_response("I could not summarize this.", &descriptor()),
            Err(SummaryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn invalid_json_is_a_parsing_error() {
        let response = "```json\n{not json}\n```";
        assert!(matches!(
            parse_summary_response(response, &descriptor()),
            Err(SummaryError::JsonParsing(_))
        ));
    }
}
