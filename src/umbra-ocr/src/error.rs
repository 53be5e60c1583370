use std::time::Duration;

use thiserror::Error;
use umbra_capture::LayoutError;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to initialize OCR engine: {0}")]
    EngineInitFailed(String),

    #[error("frame conversion error: {0}")]
    ConversionError(String),

    #[error("malformed pixel buffer: {0}")]
    MalformedBuffer(#[from] LayoutError),

    #[error("OCR processing error: {0}")]
    ProcessingError(String),

    #[error("OCR engine gave no result within {0:?}")]
    Timeout(Duration),

    #[cfg(windows)]
    #[error("windows API error: {0}")]
    WindowsError(#[from] windows::core::Error),

    #[error("image processing error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, OcrError>;
