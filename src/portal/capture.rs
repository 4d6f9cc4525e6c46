//! Network and download observation for the retrieval cascade.
//!
//! The most reliable way to obtain a document from the viewer is to watch
//! the wire rather than the UI: any inbound response whose payload starts
//! with the PDF magic header is the document, whatever the markup around it
//! looked like that week. Capture is armed BEFORE the action that triggers
//! navigation or a click, so a response that arrives while the viewer is
//! still loading queues on the stream instead of being missed. Download
//! waiting covers the strategies that trigger a browser-level download
//! instead of an inline response.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::browser::DownloadProgressState;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};

use super::types::looks_like_pdf;
use super::PortalError;
use crate::browser::DownloadEvents;

/// Response mime types worth fetching a body for. Everything else on the
/// viewer page (markup, scripts, fonts, tiles) is skipped without a body
/// round-trip.
fn candidate_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.contains("pdf") || mime.contains("octet-stream") || mime.contains("download")
}

/// A network-capture subscription on one page. Armed before the triggering
/// action; events that arrive while the caller is still clicking queue on
/// the stream and are drained by [`ArmedCapture::first_document`].
pub struct ArmedCapture {
    page: Page,
    responses: EventStream<EventResponseReceived>,
}

/// Enable the Network domain on `page` and subscribe to inbound responses.
pub async fn arm_capture(page: &Page) -> Result<ArmedCapture, PortalError> {
    page.execute(EnableParams::default()).await?;
    let responses = page.event_listener::<EventResponseReceived>().await?;
    Ok(ArmedCapture {
        page: page.clone(),
        responses,
    })
}

impl ArmedCapture {
    /// Drain responses for up to `window`, returning the first body that
    /// validates as a document. `Ok(None)` means the window elapsed without
    /// one; not an error, the cascade just moves on.
    pub async fn first_document(self, window: Duration) -> Result<Option<Vec<u8>>, PortalError> {
        let page = self.page;
        first_document_from(self.responses, window, move |event| {
            let page = page.clone();
            async move { fetch_body(&page, &event).await }
        })
        .await
    }
}

/// Drain loop behind [`ArmedCapture::first_document`]. Events already queued
/// on the stream are observed before the deadline is consulted, so nothing
/// served during viewer settling is lost.
async fn first_document_from<S, F, Fut>(
    mut responses: S,
    window: Duration,
    mut fetch: F,
) -> Result<Option<Vec<u8>>, PortalError>
where
    S: Stream<Item = Arc<EventResponseReceived>> + Unpin,
    F: FnMut(Arc<EventResponseReceived>) -> Fut,
    Fut: Future<Output = Result<Option<Vec<u8>>, PortalError>>,
{
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            maybe_event = responses.next() => {
                let Some(event) = maybe_event else {
                    // Listener stream closed: the page is gone.
                    return Ok(None);
                };
                if !candidate_mime(&event.response.mime_type) {
                    continue;
                }
                tracing::debug!(
                    url = %event.response.url,
                    mime = %event.response.mime_type,
                    "Candidate document response"
                );
                match fetch(Arc::clone(&event)).await {
                    Ok(Some(bytes)) if looks_like_pdf(&bytes) => return Ok(Some(bytes)),
                    Ok(Some(bytes)) => {
                        tracing::debug!(
                            url = %event.response.url,
                            size = bytes.len(),
                            "Response body failed document validation, discarded"
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Body may not be retrievable while the response is
                        // still streaming; keep watching.
                        tracing::debug!(url = %event.response.url, error = %e, "Body fetch failed");
                    }
                }
            }
            _ = &mut deadline => return Ok(None),
        }
    }
}

async fn fetch_body(
    page: &Page,
    event: &EventResponseReceived,
) -> Result<Option<Vec<u8>>, PortalError> {
    let reply = page
        .execute(GetResponseBodyParams::new(event.request_id.clone()))
        .await?;
    let bytes = if reply.result.base64_encoded {
        match BASE64.decode(reply.result.body.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        }
    } else {
        reply.result.body.clone().into_bytes()
    };
    Ok(Some(bytes))
}

/// Wait on pre-armed browser-connection streams for a download to complete,
/// then read (and remove) the file the completed event's GUID names.
/// `Ok(None)` on timeout or cancelled download.
pub async fn wait_for_download(
    mut events: DownloadEvents,
    dir: &Path,
    window: Duration,
) -> Result<Option<Vec<u8>>, PortalError> {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            maybe_begin = events.begins.next() => {
                if let Some(begin) = maybe_begin {
                    tracing::debug!(
                        guid = %begin.guid,
                        file = %begin.suggested_filename,
                        url = %begin.url,
                        "Download starting"
                    );
                }
            }
            maybe_progress = events.progress.next() => {
                let Some(event) = maybe_progress else { return Ok(None); };
                match event.state {
                    DownloadProgressState::Completed => {
                        return Ok(read_download_file(dir, &event.guid));
                    }
                    DownloadProgressState::Canceled => {
                        tracing::debug!(guid = %event.guid, "Download cancelled by browser");
                        return Ok(None);
                    }
                    DownloadProgressState::InProgress => {}
                }
            }
            _ = &mut deadline => return Ok(None),
        }
    }
}

/// `AllowAndName` download behavior writes the file under its GUID, so the
/// completed event names the file exactly. Stale or concurrent files in the
/// directory are never touched. The file is deleted after reading; downloads
/// are transient, never an artifact.
fn read_download_file(dir: &Path, guid: &str) -> Option<Vec<u8>> {
    let path = dir.join(guid);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Completed download file missing");
            return None;
        }
    };
    if let Err(e) = std::fs::remove_file(&path) {
        tracing::warn!(path = %path.display(), error = %e, "Could not remove downloaded file");
    }
    Some(bytes)
}
