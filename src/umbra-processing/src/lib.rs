//! umbra-processing - Encoding of captured pixels for Umbra
//!
//! Turns raw pixel buffers into self-contained bitmap files.

pub mod bitmap;
pub mod error;

pub use bitmap::{BitmapBlob, BitmapEncoder};
pub use error::EncodeError;
