pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::{ProcessingResult, ProgressEvent, RunTarget, Stage};

use thiserror::Error;

use crate::portal::PortalError;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("No facility matched query \"{0}\"")]
    FacilityNotFound(String),

    #[error(transparent)]
    Portal(#[from] PortalError),
}
