pub mod capture;
pub mod enumerator;
pub mod locator;
pub mod retriever;
pub mod types;

pub use enumerator::{DocumentList, ViewerEnumerator};
pub use locator::{FacilitySearch, PortalLocator};
pub use retriever::{DocumentFetch, RetrievalStrategy, ViewerRetriever};
pub use types::{DocumentDescriptor, FacilityRecord, FacilityRef, RetrievedDocument};

use thiserror::Error;

use crate::browser::BrowserError;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Search query must contain at least two non-whitespace characters")]
    QueryTooShort,

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No link into the records viewer found on facility page: {0}")]
    ViewerLinkNotFound(String),

    #[error("Grid row {0} not present in the rendered viewer")]
    RowNotRendered(usize),
}
