use serde::{Deserialize, Serialize};

use crate::portal::types::{DocumentDescriptor, FacilityRecord};

/// Three-valued relevance classification. Partitions every summary set
/// exactly: each summary carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Relevant,
    Maybe,
    NotRelevant,
}

impl Relevance {
    /// Lenient parse of whatever the model writes into the field.
    pub fn parse_lenient(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        if value.starts_with("not") || value.contains("irrelevant") || value == "no" {
            Self::NotRelevant
        } else if value.starts_with("relevant") || value == "yes" || value == "high" {
            Self::Relevant
        } else {
            Self::Maybe
        }
    }
}

/// Structured summary of one document, produced by the summarization
/// collaborator. The schema is a contract: missing or mistyped fields are
/// replaced with safe defaults, never propagated as failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Declared metadata carried through from the descriptor.
    pub doc_type: String,
    pub date: String,
    /// What the document says about the site itself.
    pub site_context: String,
    pub contaminants: Vec<String>,
    /// Environmental media involved (soil, groundwater, ...).
    pub media: Vec<String>,
    /// Narrative of regulatory/remedial actions described.
    pub actions: String,
    pub relevance: Relevance,
    /// Full narrative summary.
    pub narrative: String,
    /// Set when the collaborator failed and this summary is a placeholder.
    pub error: Option<String>,
}

impl DocumentSummary {
    /// Placeholder emitted when the collaborator errors. Relevance `Maybe`
    /// keeps the three-way partition exact while flagging the document for
    /// manual review.
    pub fn placeholder(descriptor: &DocumentDescriptor, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            doc_type: descriptor.doc_type.clone(),
            date: descriptor.date.clone(),
            site_context: String::new(),
            contaminants: vec![],
            media: vec![],
            actions: String::new(),
            relevance: Relevance::Maybe,
            narrative: format!("Summarization unavailable for {}.", descriptor.label()),
            error: Some(error),
        }
    }
}

/// Summarization collaborator boundary. Implementations never fail outward:
/// any fault degrades to a placeholder summary or fallback overview text.
pub trait Summarizer: Send + Sync {
    fn summarize_document(&self, text: &str, descriptor: &DocumentDescriptor) -> DocumentSummary;

    /// Facility-level overview from aggregate counts and the union of
    /// findings across relevant summaries.
    fn facility_overview(
        &self,
        facility: &FacilityRecord,
        documents_found: usize,
        documents_processed: usize,
        findings: &[String],
    ) -> String;
}
