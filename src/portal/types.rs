//! Records produced while walking the portal.
//!
//! `FacilityRecord` and `DocumentDescriptor` are parsed fresh per run and
//! never persisted; `RetrievedDocument` lives only until its text has been
//! extracted.

use serde::{Deserialize, Serialize};

use crate::config::{MIN_DOCUMENT_BYTES, PDF_MAGIC};

/// One facility row from the portal's attribute search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    /// Administrative area (county/district) the portal files the site under.
    pub county: String,
    /// Regulatory program tags (waste cleanup, storage tanks, ...).
    pub programs: Vec<String>,
}

impl FacilityRecord {
    /// Best-effort parse of one result-table row. The portal's column layout
    /// is not contractually stable, so missing columns yield blank fields
    /// rather than dropping the row.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
        let programs = cells
            .get(6)
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: cell(0),
            name: cell(1),
            address: cell(2),
            city: cell(3),
            postal_code: cell(4),
            county: cell(5),
            programs,
        }
    }
}

/// How the caller names a facility: a portal identifier, or a fully
/// qualified detail-page URL when no identifier is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityRef {
    Id(String),
    Url(String),
}

impl std::fmt::Display for FacilityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// One row of the records viewer's virtualized grid.
///
/// The id is stable only within one enumeration pass; re-enumeration may
/// renumber. The viewer exposes no durable per-document URL, so the row
/// index is the only way back to the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub id: usize,
    /// Declared category ("Permit Application", "Inspection Report", ...).
    pub doc_type: String,
    /// Declared date, free text. Not guaranteed parseable.
    pub date: String,
    /// Positional index into the viewer's row list.
    pub row_index: usize,
}

impl DocumentDescriptor {
    /// Human-readable tag used in error strings so a reader can correlate
    /// a failure with the source portal.
    pub fn label(&self) -> String {
        format!("{} dated {}", self.doc_type, self.date)
    }
}

/// A descriptor plus the raw bytes one of the cascade strategies produced.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub descriptor: DocumentDescriptor,
    pub bytes: Vec<u8>,
    /// Name of the strategy that produced the bytes.
    pub strategy: &'static str,
}

/// Magic-header + minimum-size validation. Anything failing this
/// (viewer chrome, an HTML error page, a redirect stub) is never valid
/// content.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_DOCUMENT_BYTES && bytes.starts_with(PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_validation_requires_magic_and_size() {
        let mut good = b"%PDF-1.7\n".to_vec();
        good.resize(MIN_DOCUMENT_BYTES + 1, b'x');
        assert!(looks_like_pdf(&good));

        // Right size, wrong header: an HTML error page.
        let mut html = b"<html><body>Session expired</body></html>".to_vec();
        html.resize(MIN_DOCUMENT_BYTES + 1, b' ');
        assert!(!looks_like_pdf(&html));

        // Right header, too small: a redirect stub.
        assert!(!looks_like_pdf(b"%PDF-1.4"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn facility_row_parses_full_cells() {
        let cells: Vec<String> = [
            "FL-4401",
            "ACME METALS",
            "100 Industry Rd",
            "Tampa",
            "33601",
            "Hillsborough",
            "Waste Cleanup, Storage Tanks",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let record = FacilityRecord::from_cells(&cells);
        assert_eq!(record.id, "FL-4401");
        assert_eq!(record.name, "ACME METALS");
        assert_eq!(record.county, "Hillsborough");
        assert_eq!(record.programs, vec!["Waste Cleanup", "Storage Tanks"]);
    }

    #[test]
    fn facility_row_missing_columns_yields_blanks() {
        let cells = vec!["FL-4401".to_string(), "ACME METALS".to_string()];
        let record = FacilityRecord::from_cells(&cells);
        assert_eq!(record.name, "ACME METALS");
        assert_eq!(record.address, "");
        assert_eq!(record.county, "");
        assert!(record.programs.is_empty());
    }

    #[test]
    fn descriptor_label_carries_type_and_date() {
        let descriptor = DocumentDescriptor {
            id: 0,
            doc_type: "Inspection Report".to_string(),
            date: "03/14/2019".to_string(),
            row_index: 0,
        };
        assert_eq!(descriptor.label(), "Inspection Report dated 03/14/2019");
    }
}
