use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Sitescan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// PDF magic header. Any retrieved buffer must start with this to be
/// accepted as a document.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// Minimum size for a retrieved buffer to count as a document.
/// Viewer error pages and tracking pixels are smaller than this.
pub const MIN_DOCUMENT_BYTES: usize = 1024;

/// Word-count threshold (tokens longer than two characters) above which the
/// digital text layer is trusted and OCR is skipped. Tuned for the verbose,
/// boilerplate-heavy register of regulatory filings.
pub const DIGITAL_WORD_THRESHOLD: usize = 120;

/// Minimum character count for digital text to be worth merging with OCR
/// output instead of being discarded.
pub const MIN_MERGE_TEXT_CHARS: usize = 100;

/// Minimum viable extracted text length. Below this the pipeline fails
/// rather than fabricating placeholder content.
pub const MIN_VIABLE_TEXT_CHARS: usize = 40;

/// Maximum number of pages rasterized for OCR per document.
pub const OCR_PAGE_CAP: usize = 20;

/// Rendering DPI for OCR rasterization. Higher improves recognition at
/// proportionally higher processing time.
pub const RENDER_DPI: u32 = 200;

/// Character budget for text handed to the summarization model.
pub const SUMMARY_CHAR_BUDGET: usize = 12_000;

/// Marker appended when summarization input is truncated at the budget.
pub const TRUNCATION_MARKER: &str = "\n[TRUNCATED: document text exceeds summarization budget]";

/// Settle interval after opening the records viewer. The viewer exposes no
/// ready signal, so rendering completion can only be waited out.
pub const VIEWER_SETTLE: Duration = Duration::from_secs(6);

/// Settle interval after submitting the facility search form.
pub const SEARCH_SETTLE: Duration = Duration::from_secs(3);

/// Per-strategy timeout in the retrieval cascade.
pub const STRATEGY_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for a single page navigation.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info,tower_http=warn", env!("CARGO_PKG_NAME"))
}

/// Base URL of the portal's facility attribute-search form.
pub fn portal_search_url() -> String {
    std::env::var("SITESCAN_PORTAL_URL")
        .unwrap_or_else(|_| "https://portal.example.gov/facility-search".to_string())
}

/// Detail-page URL for a facility id. The template's `{id}` placeholder is
/// substituted; overridable because the portal occasionally reshuffles paths.
pub fn facility_detail_url(id: &str) -> String {
    let template = std::env::var("SITESCAN_DETAIL_URL")
        .unwrap_or_else(|_| "https://portal.example.gov/facility/{id}".to_string());
    template.replace("{id}", id)
}

/// Substring identifying the link from a facility detail page into the
/// embedded records viewer. The host page's markup is not versioned, so the
/// link is found by substring match on the href rather than a selector.
pub fn viewer_link_hint() -> String {
    std::env::var("SITESCAN_VIEWER_HINT").unwrap_or_else(|_| "viewer".to_string())
}

/// Base URL of the local Ollama instance used for summarization.
pub fn ollama_base_url() -> String {
    std::env::var("SITESCAN_OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

/// Model used for document summarization.
pub fn summary_model() -> String {
    std::env::var("SITESCAN_MODEL").unwrap_or_else(|_| "llama3.1".to_string())
}

/// Address the HTTP surface binds to.
pub fn bind_addr() -> String {
    std::env::var("SITESCAN_BIND").unwrap_or_else(|_| "127.0.0.1:8700".to_string())
}

/// Tesseract traineddata directory, consulted only in `ocr` builds.
#[cfg(feature = "ocr")]
pub fn tessdata_dir() -> std::path::PathBuf {
    std::env::var("SITESCAN_TESSDATA")
        .or_else(|_| std::env::var("TESSDATA_PREFIX"))
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("/usr/share/tesseract-ocr/5/tessdata"))
}

/// Directory browser-level downloads are routed to.
pub fn download_dir() -> std::path::PathBuf {
    std::env::var("SITESCAN_DOWNLOAD_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("sitescan-downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_magic_is_percent_pdf() {
        assert_eq!(PDF_MAGIC, b"%PDF");
    }

    #[test]
    fn thresholds_are_ordered_sanely() {
        // A document below the merge floor must still clear the viability floor.
        assert!(MIN_VIABLE_TEXT_CHARS < MIN_MERGE_TEXT_CHARS);
        assert!(MIN_DOCUMENT_BYTES > PDF_MAGIC.len());
    }

    #[test]
    fn default_urls_parse() {
        assert!(portal_search_url().starts_with("http"));
        assert!(ollama_base_url().starts_with("http"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
