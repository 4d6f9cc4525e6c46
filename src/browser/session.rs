//! Single shared browser session.
//!
//! One headless Chromium runs per process. All navigation state (cookies,
//! portal authentication) lives on its single long-lived page, so session
//! reuse amortizes browser startup and portal login across documents and
//! runs. The cost is that all scraping serializes through one page; the
//! run-level lock makes that single-writer invariant explicit instead of
//! relying on callers behaving.

use std::path::Path;
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    EventDownloadProgress, EventDownloadWillBegin, SetDownloadBehaviorBehavior,
    SetDownloadBehaviorParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::BrowserError;

/// Cloneable handle to the live browser session.
///
/// The embedded page is the one long-lived navigation surface. Transient
/// viewer tabs are opened by the portal itself and must be closed by
/// whoever adopted them (see [`super::PageGuard`]).
#[derive(Clone)]
pub struct BrowserSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch() -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1440, 1000)
            .build()
            .map_err(BrowserError::Config)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler stream must be polled for the CDP connection to make
        // progress; it ends when the browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser handler error, stopping loop");
                    break;
                }
            }
            tracing::debug!("Browser handler loop ended");
        });

        let page = browser.new_page("about:blank").await?;

        tracing::info!("Headless browser session started");
        Ok(Self {
            inner: Arc::new(SessionInner {
                browser: Mutex::new(browser),
                page,
                handler_task,
            }),
        })
    }

    /// The long-lived page carrying all portal navigation state.
    pub fn page(&self) -> &Page {
        &self.inner.page
    }

    /// All pages currently open in the browser, in target order.
    pub async fn pages(&self) -> Result<Vec<Page>, BrowserError> {
        let browser = self.inner.browser.lock().await;
        Ok(browser.pages().await?)
    }

    /// Route browser-level downloads into `dir` and enable download events.
    /// `AllowAndName` writes each file under its download GUID, so completed
    /// downloads can be correlated to files exactly, never by mtime guessing.
    pub async fn allow_downloads(&self, dir: &Path) -> Result<(), BrowserError> {
        std::fs::create_dir_all(dir)?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(dir.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(BrowserError::Config)?;
        let browser = self.inner.browser.lock().await;
        browser.execute(params).await?;
        Ok(())
    }

    /// Subscribe to the download lifecycle. `Browser.setDownloadBehavior`
    /// emits these on the browser session, not the page target, so the
    /// listeners attach to the browser connection.
    pub async fn download_events(&self) -> Result<DownloadEvents, BrowserError> {
        let browser = self.inner.browser.lock().await;
        Ok(DownloadEvents {
            begins: browser.event_listener::<EventDownloadWillBegin>().await?,
            progress: browser.event_listener::<EventDownloadProgress>().await?,
        })
    }

    async fn shutdown(&self) {
        let mut browser = self.inner.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Browser close failed, aborting handler");
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "Browser wait after close failed");
        }
        self.inner.handler_task.abort();
    }
}

/// Browser-connection streams for one download observation window.
pub struct DownloadEvents {
    pub begins: EventStream<EventDownloadWillBegin>,
    pub progress: EventStream<EventDownloadProgress>,
}

/// Owns the process-wide session and the run-level lock.
///
/// Injected as `Arc<SessionManager>` wherever a component needs the browser.
/// `acquire` lazily starts the session on first use; `reset` discards it so
/// the next run starts clean after an unrecoverable automation fault.
pub struct SessionManager {
    session: Mutex<Option<BrowserSession>>,
    run_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            run_lock: Mutex::new(()),
        }
    }

    /// The shared session, starting the browser on first call.
    pub async fn acquire(&self) -> Result<BrowserSession, BrowserError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = BrowserSession::launch().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Tear down the session. The next `acquire` launches a fresh browser.
    pub async fn reset(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            tracing::warn!("Resetting browser session");
            session.shutdown().await;
        }
    }

    /// Serialize logical runs. Two concurrent runs over one page would
    /// corrupt shared navigation state; the second run queues here.
    pub async fn run_permit(&self) -> MutexGuard<'_, ()> {
        self.run_lock.lock().await
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_permit_serializes() {
        let manager = SessionManager::new();
        let first = manager.run_permit().await;
        // A second permit must not be grantable while the first is held.
        assert!(manager.run_lock.try_lock().is_err());
        drop(first);
        assert!(manager.run_lock.try_lock().is_ok());
    }

    #[tokio::test]
    async fn fresh_manager_has_no_session() {
        let manager = SessionManager::new();
        assert!(manager.session.lock().await.is_none());
        // reset on an empty manager is a no-op, not an error
        manager.reset().await;
        assert!(manager.session.lock().await.is_none());
    }
}
