pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod renderer;
pub mod types;

pub use ocr::{DisabledOcr, MockOcrEngine};
pub use pdf::PdfTextExtractor;
pub use pipeline::DocumentExtractor;
pub use renderer::{MockPdfPageRenderer, PdfiumRenderer};
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("No usable text: digital yield {digital_chars} chars, optical yield {optical_chars} chars, below the {minimum}-char floor")]
    NoText {
        digital_chars: usize,
        optical_chars: usize,
        minimum: usize,
    },
}
