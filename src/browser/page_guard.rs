//! RAII guard for transient viewer pages.
//!
//! chromiumoxide's `Page` has no Drop implementation; without an explicit
//! async `close()` abandoned viewer tabs leak CDP targets until the browser
//! restarts. The retriever opens a tab per strategy attempt, so leaks add up
//! fast on a long run.

use std::ops::Deref;

use chromiumoxide::Page;

/// Wraps a transient page, guaranteeing cleanup on both success and failure
/// paths: explicit async `close()` where possible, a spawned background close
/// from `Drop` otherwise.
pub struct PageGuard {
    page: Option<Page>,
    label: String,
    runtime: tokio::runtime::Handle,
}

impl PageGuard {
    pub fn new(page: Page, label: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            label: label.into(),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Explicitly close the page, consuming the guard. Preferred path:
    /// the close is awaited and failures are surfaced to the caller's logs.
    pub async fn close(mut self) {
        if let Some(page) = self.page.take() {
            match page.close().await {
                Ok(_) => tracing::debug!(page = %self.label, "Viewer page closed"),
                Err(e) => {
                    tracing::warn!(page = %self.label, error = %e, "Viewer page close failed")
                }
            }
        }
    }

    pub fn page(&self) -> &Page {
        self.page.as_ref().expect("PageGuard: page already consumed")
    }
}

impl Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        self.page()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let label = std::mem::take(&mut self.label);
            self.runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::warn!(page = %label, error = %e, "Drop-path page close failed");
                }
            });
        }
    }
}
