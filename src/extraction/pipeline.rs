//! Digital-first text extraction with optical fallback.
//!
//! Step 1 trusts the embedded text layer when it yields enough significant
//! words. Step 2 rasterizes and recognizes pages when it does not. Step 3
//! merges a partial digital layer with the optical pass instead of
//! discarding it. The pipeline never fabricates placeholder text: below the
//! viability floor it fails with `ExtractionError::NoText`.

use super::types::{
    significant_word_count, ExtractionMethod, ExtractionResult, ExtractionWarning, OcrEngine,
    PdfPageRenderer, PdfTextSource,
};
use super::ExtractionError;
use crate::config::{
    DIGITAL_WORD_THRESHOLD, MIN_MERGE_TEXT_CHARS, MIN_VIABLE_TEXT_CHARS, OCR_PAGE_CAP, RENDER_DPI,
};

/// Pages below this mean confidence get a warning attached to the result.
const LOW_CONFIDENCE_FLOOR: f32 = 0.5;

/// Text extractor with injectable backends.
pub struct DocumentExtractor {
    text_source: Box<dyn PdfTextSource>,
    renderer: Box<dyn PdfPageRenderer>,
    ocr: Box<dyn OcrEngine>,
}

impl DocumentExtractor {
    pub fn new(
        text_source: Box<dyn PdfTextSource>,
        renderer: Box<dyn PdfPageRenderer>,
        ocr: Box<dyn OcrEngine>,
    ) -> Self {
        Self {
            text_source,
            renderer,
            ocr,
        }
    }

    pub fn extract(&self, pdf_bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        // Step 1: digital text layer. A parse failure here is not fatal:
        // scanner-produced files often trip the text-layer parser while
        // rasterizing fine.
        let digital_pages = match self.text_source.extract_pages(pdf_bytes) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::debug!(error = %e, "Digital text layer unreadable, going optical");
                Vec::new()
            }
        };
        let digital_text = digital_pages.join("\n").trim().to_string();
        let word_count = significant_word_count(&digital_text);

        if word_count > DIGITAL_WORD_THRESHOLD {
            tracing::info!(
                words = word_count,
                pages = digital_pages.len(),
                "Digital text layer sufficient, skipping OCR"
            );
            return Ok(ExtractionResult {
                text: digital_text,
                method: ExtractionMethod::Digital,
                page_count: digital_pages.len(),
                confidence: None,
                warnings: vec![],
            });
        }

        // Step 2: likely scanned. Rasterize and recognize up to the page cap.
        tracing::info!(
            words = word_count,
            "Digital yield below threshold, treating document as scanned"
        );
        let total_pages = self
            .renderer
            .page_count(pdf_bytes)
            .unwrap_or_else(|_| digital_pages.len())
            .max(1);
        let rendered_pages = total_pages.min(OCR_PAGE_CAP);

        let mut warnings = Vec::new();
        if rendered_pages < total_pages {
            warnings.push(ExtractionWarning::PageCapReached {
                rendered: rendered_pages,
                total: total_pages,
            });
        }

        let mut page_texts = Vec::new();
        let mut confidences = Vec::new();
        for page in 0..rendered_pages {
            let recognized = self
                .renderer
                .render_page(pdf_bytes, page, RENDER_DPI)
                .and_then(|png| self.ocr.ocr_image(&png));
            match recognized {
                Ok(result) => {
                    if result.confidence < LOW_CONFIDENCE_FLOOR {
                        warnings.push(ExtractionWarning::LowConfidencePage {
                            page: page + 1,
                            confidence: result.confidence,
                        });
                    }
                    confidences.push(result.confidence);
                    page_texts.push(format!("--- Page {} ---\n{}", page + 1, result.text));
                }
                Err(e) => {
                    tracing::warn!(page = page + 1, error = %e, "Page OCR failed, skipping");
                }
            }
        }

        let optical_text = page_texts.join("\n\n");
        let confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
        };

        // Step 3: merge a non-trivial partial digital layer with the optical
        // pass; the digital fragment disambiguates recognition errors
        // downstream.
        let (method, text) = if optical_text.trim().len() >= MIN_VIABLE_TEXT_CHARS
            && digital_text.len() >= MIN_MERGE_TEXT_CHARS
        {
            warnings.push(ExtractionWarning::PartialDigitalLayer {
                chars: digital_text.len(),
            });
            (
                ExtractionMethod::Merged,
                format!("{digital_text}\n\n{optical_text}"),
            )
        } else {
            (ExtractionMethod::Optical, optical_text)
        };

        if text.trim().len() < MIN_VIABLE_TEXT_CHARS {
            return Err(ExtractionError::NoText {
                digital_chars: digital_text.len(),
                optical_chars: text.trim().len(),
                minimum: MIN_VIABLE_TEXT_CHARS,
            });
        }

        tracing::info!(
            method = method.as_str(),
            pages = rendered_pages,
            confidence = ?confidence,
            "Optical extraction complete"
        );
        Ok(ExtractionResult {
            text,
            method,
            page_count: total_pages,
            confidence,
            warnings,
        })
    }
}
