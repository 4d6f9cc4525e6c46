use serde::{Deserialize, Serialize};

use crate::portal::types::{FacilityRecord, FacilityRef};
use crate::summary::types::DocumentSummary;

/// What a run is asked to process: a free-text search query, or a
/// pre-resolved facility reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTarget {
    Query(String),
    Facility(FacilityRef),
}

/// Terminal artifact of one orchestration run. The only thing returned to
/// the caller; the core persists nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub facility: FacilityRecord,
    pub overview: String,
    pub documents_found: usize,
    pub documents_processed: usize,
    /// In enumeration order.
    pub summaries: Vec<DocumentSummary>,
    /// Human-readable soft-failure strings, each naming the document's
    /// declared type and date.
    pub errors: Vec<String>,
}

/// Progress channel stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Locating,
    Enumerating,
    Retrieving,
    Summarizing,
    Done,
    Failed,
}

/// One discrete event on the progress channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// 0–100.
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facilities: Option<Vec<FacilityRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_found: Option<usize>,
    /// Most recently completed summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<DocumentSummary>,
    /// Present only on the terminal `Done` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Locating => "locating",
            Stage::Enumerating => "enumerating",
            Stage::Retrieving => "retrieving",
            Stage::Summarizing => "summarizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl ProgressEvent {
    pub fn new(stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            message: message.into(),
            facilities: None,
            documents_found: None,
            summary: None,
            result: None,
        }
    }

    pub fn with_facilities(mut self, facilities: Vec<FacilityRecord>) -> Self {
        self.facilities = Some(facilities);
        self
    }

    pub fn with_documents_found(mut self, count: usize) -> Self {
        self.documents_found = Some(count);
        self
    }

    pub fn with_summary(mut self, summary: DocumentSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_result(mut self, result: ProcessingResult) -> Self {
        self.result = Some(result);
        self
    }
}
