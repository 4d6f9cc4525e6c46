//! Resilient retrieval and summarization of facility records from a public
//! regulatory document portal.
//!
//! A run locates a facility by name, walks its embedded records viewer,
//! retrieves each listed document through a cascade of strategies, extracts
//! text (digital layer first, OCR fallback), and summarizes with a local
//! Ollama model. Progress streams to the caller over SSE; nothing is
//! persisted.

pub mod browser;
pub mod config;
pub mod extraction;
pub mod portal;
pub mod run;
pub mod server;
pub mod summary;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use browser::SessionManager;
use extraction::pipeline::DocumentExtractor;
use extraction::types::OcrEngine;
use extraction::{PdfTextExtractor, PdfiumRenderer};
use portal::{PortalLocator, ViewerEnumerator, ViewerRetriever};
use run::Orchestrator;
use summary::types::Summarizer;
use summary::{OllamaClient, OllamaSummarizer};

#[cfg(feature = "ocr")]
fn build_ocr_engine() -> Box<dyn OcrEngine> {
    match extraction::ocr::TesseractOcr::new(&config::tessdata_dir()) {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract unavailable, scanned documents will fail");
            Box::new(extraction::DisabledOcr)
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn build_ocr_engine() -> Box<dyn OcrEngine> {
    tracing::info!("Built without OCR support, scanned documents will fail extraction");
    Box::new(extraction::DisabledOcr)
}

/// Wire up all components and serve the HTTP surface until terminated.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        version = config::APP_VERSION,
        portal = %config::portal_search_url(),
        "Starting {}",
        config::APP_NAME
    );

    let session = Arc::new(SessionManager::new());
    let locator = Arc::new(PortalLocator::new(Arc::clone(&session)));
    let enumerator = Arc::new(ViewerEnumerator::new(Arc::clone(&session)));
    let retriever = Arc::new(ViewerRetriever::new(Arc::clone(&session)));

    let renderer = PdfiumRenderer::new()?;
    let extractor = Arc::new(DocumentExtractor::new(
        Box::new(PdfTextExtractor),
        Box::new(renderer),
        build_ocr_engine(),
    ));

    // Summarization degrades per document, so an unreachable model at
    // startup is a warning rather than a refusal to serve.
    let summarizer: Arc<dyn Summarizer> = match OllamaSummarizer::from_config() {
        Ok(summarizer) => Arc::new(summarizer),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Summarization model not confirmed, summaries may fall back to placeholders"
            );
            Arc::new(OllamaSummarizer::new(
                OllamaClient::default_local()?,
                config::summary_model(),
            ))
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&session),
        locator.clone(),
        enumerator,
        retriever,
        Arc::clone(&extractor),
        Arc::clone(&summarizer),
    ));

    server::serve(server::AppState {
        orchestrator,
        locator,
        extractor,
        summarizer,
    })
    .await?;

    Ok(())
}
