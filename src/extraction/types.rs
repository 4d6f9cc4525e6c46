use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Result of text extraction from one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub method: ExtractionMethod,
    pub page_count: usize,
    /// Mean per-page OCR confidence. Only meaningful for optical/merged.
    pub confidence: Option<f32>,
    pub warnings: Vec<ExtractionWarning>,
}

/// How the text was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded text layer of a digitally-authored document.
    Digital,
    /// Character recognition over rasterized pages.
    Optical,
    /// Partial digital text combined with OCR output. Kept rather than
    /// discarded: the digital fragment disambiguates recognition errors
    /// downstream.
    Merged,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Optical => "optical",
            Self::Merged => "merged",
        }
    }
}

/// Quality notes attached to a result without failing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionWarning {
    LowConfidencePage { page: usize, confidence: f32 },
    PageCapReached { rendered: usize, total: usize },
    PartialDigitalLayer { chars: usize },
}

/// Raw OCR output for one page image.
#[derive(Debug)]
pub struct OcrPageResult {
    pub text: String,
    /// 0.0–1.0 mean recognition confidence for the page.
    pub confidence: f32,
}

/// Digital text layer access, mockable.
pub trait PdfTextSource: Send + Sync {
    /// Per-page text from the embedded text layer, in page order.
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;

    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;
}

/// Page rasterization, mockable.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Render one page to a PNG at the given DPI.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}

/// OCR engine abstraction, mockable.
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// Count tokens longer than two characters. The digital/optical decision
/// keys off this rather than raw length: a scanned PDF's text layer is
/// typically a sprinkle of one- and two-character artifacts.
pub fn significant_word_count(text: &str) -> usize {
    text.split_whitespace().filter(|w| w.len() > 2).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_short_tokens() {
        assert_eq!(significant_word_count("a an the cat sat"), 3);
        assert_eq!(significant_word_count("x y z"), 0);
        assert_eq!(significant_word_count(""), 0);
    }

    #[test]
    fn word_count_on_ocr_artifacts_is_low() {
        // The kind of text layer a scanner bakes into a PDF.
        assert_eq!(significant_word_count("| . , ~ ° ii l1"), 0);
    }

    #[test]
    fn method_tags_are_wire_stable() {
        assert_eq!(ExtractionMethod::Digital.as_str(), "digital");
        assert_eq!(ExtractionMethod::Optical.as_str(), "optical");
        assert_eq!(ExtractionMethod::Merged.as_str(), "merged");
    }
}
