//! Shadow-text OCR for Umbra
//!
//! Binarizes captured regions so faint, low-contrast text stands out, then
//! reads it with an injected [`OcrEngine`]. On Windows the engine is
//! Windows.Media.Ocr; boxes come back relative to the captured region.

mod engine;
mod error;
mod preprocess;
mod recognizer;
#[cfg(windows)]
mod windows_engine;

use std::sync::Arc;

pub use engine::{estimate_confidence, EngineOutput, OcrEngine, RawText, ScriptedEngine};
pub use error::{OcrError, Result};
pub use preprocess::{BinarizedImage, OcrThreshold, Polarity, PreprocessOptions, ShadowPreprocessor};
pub use recognizer::{Recognizer, TextMatch, DEFAULT_OCR_TIMEOUT};
#[cfg(windows)]
pub use windows_engine::WindowsOcrEngine;

/// OCR engine for the current platform, for `language_tag` or the user's languages
#[cfg(windows)]
pub fn native_engine(language_tag: Option<&str>) -> Result<Arc<dyn OcrEngine>> {
    Ok(Arc::new(WindowsOcrEngine::new(language_tag)?))
}

/// OCR engine for the current platform, for `language_tag` or the user's languages
#[cfg(not(windows))]
pub fn native_engine(_language_tag: Option<&str>) -> Result<Arc<dyn OcrEngine>> {
    Err(OcrError::EngineInitFailed(
        "no OCR engine is available on this platform".to_string(),
    ))
}
