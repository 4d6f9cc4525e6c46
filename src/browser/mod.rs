pub mod page_guard;
pub mod session;

pub use page_guard::PageGuard;
pub use session::{BrowserSession, DownloadEvents, SessionManager};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser configuration error: {0}")]
    Config(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Browser operation timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
