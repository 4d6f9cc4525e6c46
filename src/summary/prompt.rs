//! Prompt assembly for the summarization model.

use crate::config::{SUMMARY_CHAR_BUDGET, TRUNCATION_MARKER};
use crate::portal::types::{DocumentDescriptor, FacilityRecord};

pub const DOCUMENT_SYSTEM_PROMPT: &str = "You are an environmental regulatory analyst. \
You read documents retrieved from a state records portal and produce structured summaries. \
Respond with a single fenced ```json block containing exactly these fields: \
site_context (string), contaminants (array of strings), media (array of strings), \
actions (string), relevance (one of: relevant, maybe, not_relevant), narrative (string). \
After the JSON block, write nothing else.";

pub const OVERVIEW_SYSTEM_PROMPT: &str = "You are an environmental regulatory analyst. \
Write a concise plain-text overview of a facility's regulatory history from the \
aggregate information provided. No markdown, no preamble.";

/// Truncate text to the summarization character budget, marking the cut.
/// The cut lands on a char boundary; the budget is in characters, not bytes.
pub fn truncate_to_budget(text: &str) -> String {
    if text.chars().count() <= SUMMARY_CHAR_BUDGET {
        return text.to_string();
    }
    let mut kept: String = text.chars().take(SUMMARY_CHAR_BUDGET).collect();
    kept.push_str(TRUNCATION_MARKER);
    kept
}

pub fn document_prompt(text: &str, descriptor: &DocumentDescriptor) -> String {
    format!(
        "Document metadata:\n- declared type: {}\n- declared date: {}\n- enumeration id: {}\n\n\
         Document text:\n{}",
        descriptor.doc_type,
        descriptor.date,
        descriptor.id,
        truncate_to_budget(text)
    )
}

pub fn overview_prompt(
    facility: &FacilityRecord,
    documents_found: usize,
    documents_processed: usize,
    findings: &[String],
) -> String {
    let findings_block = if findings.is_empty() {
        "(none)".to_string()
    } else {
        findings
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Facility: {} ({}), {} {}, county: {}\nPrograms: {}\n\
         Documents found: {documents_found}\nDocuments processed: {documents_processed}\n\
         Findings from relevant documents:\n{findings_block}",
        facility.name,
        facility.id,
        facility.address,
        facility.city,
        facility.county,
        facility.programs.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_to_budget("short"), "short");
    }

    #[test]
    fn long_text_is_cut_and_marked() {
        let long = "w".repeat(SUMMARY_CHAR_BUDGET + 500);
        let out = truncate_to_budget(&long);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            out.chars().count(),
            SUMMARY_CHAR_BUDGET + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multi-byte chars must not be split.
        let long = "é".repeat(SUMMARY_CHAR_BUDGET + 10);
        let out = truncate_to_budget(&long);
        assert!(out.starts_with('é'));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn document_prompt_carries_declared_metadata() {
        let descriptor = crate::portal::types::DocumentDescriptor {
            id: 7,
            doc_type: "Inspection Report".to_string(),
            date: "01/02/2003".to_string(),
            row_index: 7,
        };
        let prompt = document_prompt("body text", &descriptor);
        assert!(prompt.contains("Inspection Report"));
        assert!(prompt.contains("01/02/2003"));
        assert!(prompt.contains("body text"));
    }
}
