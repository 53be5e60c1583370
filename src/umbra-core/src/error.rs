//! Session and configuration errors

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use umbra_capture::{CaptureError, Rect};
use umbra_ocr::OcrError;
use umbra_processing::EncodeError;

#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("window not found: {0}")]
    NotFound(String),

    #[error("invalid region {rect}: {reason}")]
    InvalidRegion { rect: Rect, reason: String },

    #[error("capture failed: {0}")]
    Capture(CaptureError),

    #[error("bitmap encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    #[error("text recognition failed: {0}")]
    Recognition(OcrError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl ScreenshotError {
    /// Whether the session must drop its handle and resolve again
    pub fn invalidates_handle(&self) -> bool {
        matches!(self, ScreenshotError::Capture(e) if e.invalidates_handle())
    }
}

impl From<CaptureError> for ScreenshotError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::WindowNotFound(what) => ScreenshotError::NotFound(what),
            CaptureError::InvalidRegion { rect, reason } => {
                ScreenshotError::InvalidRegion { rect, reason }
            }
            CaptureError::Timeout { operation, after } => {
                ScreenshotError::Timeout { operation, after }
            }
            other => ScreenshotError::Capture(other),
        }
    }
}

impl From<OcrError> for ScreenshotError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::Timeout(after) => ScreenshotError::Timeout {
                operation: "text recognition",
                after,
            },
            other => ScreenshotError::Recognition(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScreenshotError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("profile '{0}' not found")]
    UnknownProfile(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
