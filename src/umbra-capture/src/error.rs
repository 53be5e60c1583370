//! Capture error types

use std::time::Duration;

use thiserror::Error;

use crate::region::Rect;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no window matches {0}")]
    WindowNotFound(String),

    #[error("invalid region {rect}: {reason}")]
    InvalidRegion { rect: Rect, reason: String },

    #[error("window handle is no longer valid")]
    HandleInvalid,

    #[error("access denied - the window refused to render its content")]
    AccessDenied,

    #[error("frame acquisition failed: {0}")]
    FrameAcquisition(String),

    #[error("window enumeration failed: {0}")]
    Enumeration(String),

    #[error("timeout waiting for {operation} after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("no capture backend is available on this platform")]
    Unsupported,

    #[cfg(windows)]
    #[error("windows error: {0}")]
    Windows(#[from] windows::core::Error),
}

impl CaptureError {
    /// Whether the error means the resolved handle must be dropped and resolved again.
    pub fn invalidates_handle(&self) -> bool {
        matches!(self, CaptureError::HandleInvalid)
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
