use super::types::PdfTextSource;
use super::ExtractionError;

/// Digital text layer extractor using the pdf-extract crate.
pub struct PdfTextExtractor;

impl PdfTextSource for PdfTextExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
    }

    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;
        Ok(pages.len())
    }
}

/// Mock text source with a fixed per-page yield.
pub struct MockPdfTextSource {
    pub pages: Vec<String>,
}

impl MockPdfTextSource {
    pub fn new(pages: Vec<&str>) -> Self {
        Self {
            pages: pages.into_iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl PdfTextSource for MockPdfTextSource {
    fn extract_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        Ok(self.pages.clone())
    }

    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages.len())
    }
}
