//! Encoding error types

use thiserror::Error;
use umbra_capture::LayoutError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("malformed pixel buffer: {0}")]
    MalformedBuffer(#[from] LayoutError),

    #[error("a {width}x{height} bitmap exceeds the 4 GiB file size limit")]
    TooLarge { width: u32, height: u32 },

    #[error("bitmap encoder failed: {0}")]
    Encoder(String),
}

pub type Result<T> = std::result::Result<T, EncodeError>;
