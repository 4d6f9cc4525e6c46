//! Document retrieval cascade against the records viewer.
//!
//! The viewer's markup and download affordances are unstable and
//! undocumented, so retrieval is a strictly ordered list of strategies,
//! each with its own timeout, short-circuiting on the first buffer that
//! validates as a document. Exhausting the list is a soft failure: the
//! document is reported unavailable, the run continues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Element, Page};

use super::capture::{arm_capture, wait_for_download, ArmedCapture};
use super::enumerator::GRID_ROW_SELECTORS;
use super::locator::first_matching;
use super::types::{looks_like_pdf, DocumentDescriptor, RetrievedDocument};
use super::PortalError;
use crate::browser::{BrowserSession, PageGuard, SessionManager};
use crate::config;

/// Retrieval boundary, mockable for orchestrator tests.
#[async_trait]
pub trait DocumentFetch: Send + Sync {
    /// `Ok(None)` is the soft-failure outcome: the cascade exhausted without
    /// a valid document. Callers must treat it as "unavailable", not raise.
    async fn retrieve(
        &self,
        descriptor: &DocumentDescriptor,
    ) -> Result<Option<RetrievedDocument>, PortalError>;
}

/// The cascade, in attempt order. Ordering is load-bearing: network capture
/// needs no knowledge of the viewer's UI and so goes first; printing the
/// viewer is only viable when a viewer is known to have rendered and so
/// goes last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    NetworkCapture,
    ToolbarDownload,
    MenuCascade,
    PrintToPdf,
}

impl RetrievalStrategy {
    pub fn ordered() -> &'static [RetrievalStrategy] {
        &[
            Self::NetworkCapture,
            Self::ToolbarDownload,
            Self::MenuCascade,
            Self::PrintToPdf,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkCapture => "network_capture",
            Self::ToolbarDownload => "toolbar_download",
            Self::MenuCascade => "menu_cascade",
            Self::PrintToPdf => "print_to_pdf",
        }
    }
}

impl std::fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strategies to run given whether a viewer is confirmed on the target page.
/// Printing an unconfirmed page would render whatever is there (often the
/// results grid) into a perfectly valid-looking PDF, so the print fallback
/// only runs with confirmation.
pub fn strategies_for(viewer_confirmed: bool) -> &'static [RetrievalStrategy] {
    if viewer_confirmed {
        RetrievalStrategy::ordered()
    } else {
        &[
            RetrievalStrategy::NetworkCapture,
            RetrievalStrategy::ToolbarDownload,
            RetrievalStrategy::MenuCascade,
        ]
    }
}

/// Controls the viewer often hides download affordances behind. Scored by
/// text/attribute content because the toolbar's structure is not stable.
const CONTROL_SELECTORS: &str =
    "button, a, [role='button'], [role='menuitem'], .toolbar span, .toolbarButton";

const MENU_ITEM_SELECTORS: &str = "[role='menuitem'], .menu-item, .dropdown-item, ul li";

/// Elements only a document viewer renders. Their presence on the current
/// page is what confirms an in-place viewer.
const VIEWER_ELEMENT_SELECTORS: &[&str] = &[
    "embed[type='application/pdf']",
    "iframe[src*='viewer']",
    "#viewerContainer",
    ".pdfViewer",
];

/// Score a control's combined text for "this downloads the document".
/// Higher is better; zero means not a download affordance at all.
pub fn score_download_control(text: &str) -> u32 {
    let text = text.to_lowercase();
    let mut score = 0;
    if text.contains("download") {
        score += 4;
    }
    if text.contains("save") {
        score += 2;
    }
    if text.contains("export") {
        score += 2;
    }
    if text.contains("pdf") {
        score += 1;
    }
    score
}

/// Score a menu item label. "Without annotations" wins over a plain PDF
/// export: annotation-flattened renditions sometimes fail server-side.
pub fn score_menu_label(text: &str) -> u32 {
    let text = text.to_lowercase();
    let mut score = 0;
    if text.contains("without annotation") {
        score += 8;
    }
    if text.contains("pdf") {
        score += 4;
    }
    if text.contains("download") {
        score += 4;
    }
    if text.contains("original") {
        score += 2;
    }
    if text.contains("print") {
        score += 1;
    }
    score
}

/// Live retriever over the shared session.
pub struct ViewerRetriever {
    session: Arc<SessionManager>,
}

impl ViewerRetriever {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Select the target row and wait for the portal's own viewer to open,
    /// typically in a new tab. Falls back to the current page when the
    /// viewer renders in-place.
    ///
    /// Network capture is armed on the originating page BEFORE the row is
    /// activated, and on a new tab the moment it is discovered, so the
    /// document response served during the viewer's first load is observed
    /// rather than missed. The returned capture carries whatever queued
    /// while the viewer settled.
    async fn open_viewer(
        &self,
        session: &BrowserSession,
        descriptor: &DocumentDescriptor,
    ) -> Result<(ViewerTarget, ArmedCapture), PortalError> {
        session.allow_downloads(&config::download_dir()).await?;

        let page = session.page();
        let row = find_row(page, descriptor.row_index)
            .await?
            .ok_or(PortalError::RowNotRendered(descriptor.row_index))?;

        // Snapshot open targets before triggering the viewer so the new tab
        // is recognizable afterwards.
        let before: Vec<String> = session
            .pages()
            .await?
            .iter()
            .map(|p| p.target_id().as_ref().to_string())
            .collect();

        let same_page_capture = arm_capture(page).await?;

        // Click selects the row; the dblclick event (synthesized, Element
        // exposes no native double click) asks the portal to open its viewer.
        row.click().await?;
        row.call_js_fn(
            "function() { this.dispatchEvent(new MouseEvent('dblclick', {bubbles: true})); }",
            false,
        )
        .await?;

        // Poll for a new target; the viewer tab can take several seconds.
        let deadline = tokio::time::Instant::now() + config::VIEWER_SETTLE;
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            for candidate in session.pages().await? {
                let id = candidate.target_id().as_ref().to_string();
                if !before.contains(&id) {
                    tracing::debug!(row = descriptor.row_index, "Viewer opened in new tab");
                    let capture = arm_capture(&candidate).await?;
                    let guard =
                        PageGuard::new(candidate, format!("viewer-row-{}", descriptor.row_index));
                    return Ok((ViewerTarget::NewTab(guard), capture));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(row = descriptor.row_index, "No new tab; viewer rendered in place");
                return Ok((ViewerTarget::SamePage, same_page_capture));
            }
        }
    }

    /// Run one strategy. `primed` holds the capture armed before the viewer
    /// was opened; the first network-capture attempt consumes it, later
    /// attempts arm their own.
    async fn attempt(
        &self,
        strategy: RetrievalStrategy,
        session: &BrowserSession,
        page: &Page,
        primed: &mut Option<ArmedCapture>,
    ) -> Result<Option<Vec<u8>>, PortalError> {
        let window = config::STRATEGY_TIMEOUT;
        match strategy {
            RetrievalStrategy::NetworkCapture => {
                let capture = match primed.take() {
                    Some(capture) => capture,
                    None => arm_capture(page).await?,
                };
                capture.first_document(window).await
            }
            RetrievalStrategy::ToolbarDownload => {
                let Some(control) = best_control(page, CONTROL_SELECTORS, score_download_control)
                    .await?
                else {
                    return Ok(None);
                };
                // Both observers are armed before the click so neither the
                // response nor the download-begin event can slip past.
                let capture = arm_capture(page).await?;
                let downloads = session.download_events().await?;
                control.click().await?;
                race_capture_and_download(capture, downloads, window).await
            }
            RetrievalStrategy::MenuCascade => {
                // The toolbar strategy may have left a menu open; if not,
                // re-invoke the best control to open it.
                if let Some(control) =
                    best_control(page, CONTROL_SELECTORS, score_download_control).await?
                {
                    let _ = control.click().await;
                }
                let Some(item) = best_control(page, MENU_ITEM_SELECTORS, score_menu_label).await?
                else {
                    return Ok(None);
                };
                let capture = arm_capture(page).await?;
                let downloads = session.download_events().await?;
                item.click().await?;
                race_capture_and_download(capture, downloads, window).await
            }
            RetrievalStrategy::PrintToPdf => {
                match tokio::time::timeout(window, page.pdf(PrintToPdfParams::default())).await {
                    Ok(Ok(bytes)) => Ok(Some(bytes)),
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "Print fallback failed");
                        Ok(None)
                    }
                    Err(_) => Ok(None),
                }
            }
        }
    }
}

#[async_trait]
impl DocumentFetch for ViewerRetriever {
    async fn retrieve(
        &self,
        descriptor: &DocumentDescriptor,
    ) -> Result<Option<RetrievedDocument>, PortalError> {
        let session = self.session.acquire().await?;
        let (target, capture) = self.open_viewer(&session, descriptor).await?;
        let page = match &target {
            ViewerTarget::NewTab(guard) => guard.page(),
            ViewerTarget::SamePage => session.page(),
        };

        // A new tab is the viewer by construction. In-place rendering needs
        // viewer-specific markup on the page before the print fallback is
        // trusted with it.
        let viewer_confirmed = match &target {
            ViewerTarget::NewTab(_) => true,
            ViewerTarget::SamePage => first_matching(page, VIEWER_ELEMENT_SELECTORS)
                .await
                .is_some(),
        };

        let mut primed = Some(capture);
        let mut outcome = None;
        for strategy in strategies_for(viewer_confirmed) {
            tracing::debug!(
                document = %descriptor.label(),
                strategy = %strategy,
                "Attempting retrieval strategy"
            );
            match self.attempt(*strategy, &session, page, &mut primed).await {
                Ok(Some(bytes)) if looks_like_pdf(&bytes) => {
                    tracing::info!(
                        document = %descriptor.label(),
                        strategy = %strategy,
                        size = bytes.len(),
                        "Document retrieved"
                    );
                    outcome = Some(RetrievedDocument {
                        descriptor: descriptor.clone(),
                        bytes,
                        strategy: strategy.as_str(),
                    });
                    break;
                }
                Ok(Some(bytes)) => {
                    // Invalid buffers are discarded, never returned.
                    tracing::debug!(
                        document = %descriptor.label(),
                        strategy = %strategy,
                        size = bytes.len(),
                        "Strategy produced a non-document buffer, continuing"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        document = %descriptor.label(),
                        strategy = %strategy,
                        error = %e,
                        "Strategy errored, continuing cascade"
                    );
                }
            }
        }

        // The transient viewer tab is closed on both outcomes.
        if let ViewerTarget::NewTab(guard) = target {
            guard.close().await;
        }

        if outcome.is_none() {
            tracing::warn!(document = %descriptor.label(), "Retrieval cascade exhausted");
        }
        Ok(outcome)
    }
}

enum ViewerTarget {
    NewTab(PageGuard),
    SamePage,
}

/// The grid row at `row_index` among currently rendered rows.
async fn find_row(page: &Page, row_index: usize) -> Result<Option<Element>, PortalError> {
    for selector in GRID_ROW_SELECTORS {
        if let Ok(rows) = page.find_elements(*selector).await {
            if !rows.is_empty() {
                return Ok(rows.into_iter().nth(row_index));
            }
        }
    }
    Ok(None)
}

/// Highest-scoring control under `selectors` per `score`, considering inner
/// text plus title/aria-label attributes. None when nothing scores above 0.
async fn best_control(
    page: &Page,
    selectors: &str,
    score: fn(&str) -> u32,
) -> Result<Option<Element>, PortalError> {
    let elements = page.find_elements(selectors).await.unwrap_or_default();
    let mut best: Option<(u32, Element)> = None;
    for element in elements {
        let mut text = element.inner_text().await.ok().flatten().unwrap_or_default();
        for attr in ["title", "aria-label"] {
            if let Ok(Some(value)) = element.attribute(attr).await {
                text.push(' ');
                text.push_str(&value);
            }
        }
        let value = score(&text);
        if value > 0 && best.as_ref().map_or(true, |(s, _)| value > *s) {
            best = Some((value, element));
        }
    }
    Ok(best.map(|(_, element)| element))
}

/// Await-first-of: a captured network response vs a completed browser
/// download, under one shared window. Both observers were armed before the
/// triggering click.
async fn race_capture_and_download(
    capture: ArmedCapture,
    downloads: crate::browser::DownloadEvents,
    window: Duration,
) -> Result<Option<Vec<u8>>, PortalError> {
    let dir = config::download_dir();
    tokio::select! {
        captured = capture.first_document(window) => captured,
        downloaded = wait_for_download(downloads, &dir, window) => downloaded,
    }
}
