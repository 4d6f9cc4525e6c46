//! PDF page rendering via Google PDFium.
//!
//! Renders individual pages to PNG for optical recognition. PDFium handles
//! the PDF complexities the text-layer path cannot: CIDFont encodings,
//! embedded fonts, layers, transparency.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation creates a
//! fresh `Pdfium` instance because the upstream type is `!Send`; the OS
//! caches `dlopen` calls, so repeat loads are near-free.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on oversized pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a renderer, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings =
            Pdfium::bind_to_library(&path).map_err(|e| ExtractionError::PdfRendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings =
        Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!(
                "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
            ),
        })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors, detecting encrypted documents for clearer messages.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = format!("{e}").to_lowercase();
    if msg.contains("password") || msg.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
/// Preserves aspect ratio when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();
        let page_index =
            u16::try_from(page_number).map_err(|_| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Page index {page_number} exceeds u16 maximum"),
            })?;

        let page = pages
            .get(page_index)
            .map_err(|_| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (document has {} pages)",
                    pages.len()
                ),
            })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w != uncapped_w {
            warn!(
                page = page_number,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        let png_bytes = cursor.into_inner();
        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );
        Ok(png_bytes)
    }
}

// ---------------------------------------------------------------------------
// Mock for testing
// ---------------------------------------------------------------------------

/// Mock page renderer returning a fixed byte stub per page, so pipeline
/// tests run without the PDFium binary.
pub struct MockPdfPageRenderer {
    page_count: usize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if page_number >= self.page_count {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: "page out of range".to_string(),
            });
        }
        Ok(format!("png-page-{page_number}").into_bytes())
    }
}
