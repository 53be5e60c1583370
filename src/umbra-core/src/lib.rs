//! Umbra Core Library
//!
//! The `Screenshot` session tying window resolution, capture, BMP encoding and
//! shadow-text OCR together, plus configuration and logging for the CLI.

pub mod colored_logger;
pub mod config;
pub mod error;
pub mod session;

pub use config::Config;
pub use error::{ConfigError, Result, ScreenshotError};
pub use session::Screenshot;
