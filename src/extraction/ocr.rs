use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Tesseract-backed OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractOcr {
    tessdata_dir: std::path::PathBuf,
    lang: String,
}

#[cfg(feature = "ocr")]
impl TesseractOcr {
    /// Initialize with a tessdata directory containing English traineddata.
    pub fn new(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.join("eng.traineddata").exists() {
            return Err(ExtractionError::OcrInit(format!(
                "eng.traineddata not found under {}",
                tessdata_dir.display()
            )));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
            lang: "eng".to_string(),
        })
    }

    /// Set language(s) for recognition (e.g. "eng", "eng+spa").
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractOcr {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let tessdata = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata), Some(&self.lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }
}

/// Stand-in for builds compiled without the `ocr` feature. Every call
/// fails, so scanned documents surface as extraction errors rather than
/// silently yielding empty text.
pub struct DisabledOcr;

impl OcrEngine for DisabledOcr {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit(
            "compiled without OCR support (enable the `ocr` feature)".into(),
        ))
    }
}

/// Mock OCR engine for unit testing without Tesseract installed.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    /// When set, every call fails; used to exercise the no-text path.
    pub fail: bool,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            fail: true,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::OcrProcessing("mock engine failure".into()));
        }
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}
