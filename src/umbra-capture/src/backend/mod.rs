//! Capture backends: the OS primitives the pipeline is built on
//!
//! A backend enumerates windows and copies pixels out of them. The native
//! backend talks to GDI on Windows; [`memory::MemoryBackend`] serves scripted
//! windows for tests and headless use.

use std::sync::Arc;

use crate::error::Result;
use crate::pixels::PixelBuffer;
use crate::region::{Rect, Size};
use crate::window::{Surface, WindowId, WindowInfo};

pub mod memory;

#[cfg(windows)]
pub mod gdi;

/// Window enumeration and pixel acquisition for one platform.
///
/// Implementations must enumerate in a stable order and must capture a
/// window's own content regardless of what overlaps it. `capture` receives a
/// rectangle already validated against [`client_size`](Self::client_size) and
/// returns exactly `rect.width` x `rect.height` pixels.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Live top-level windows
    fn enumerate(&self) -> Result<Vec<WindowInfo>>;

    /// Direct children of `parent`, with bounds in the parent's client coordinates
    fn enumerate_children(&self, parent: WindowId) -> Result<Vec<WindowInfo>>;

    /// Current client-area size of a surface
    fn client_size(&self, surface: Surface) -> Result<Size>;

    /// Copy `rect` (client coordinates) out of a surface
    fn capture(&self, surface: Surface, rect: Rect) -> Result<PixelBuffer>;
}

/// Backend for the current platform
#[cfg(windows)]
pub fn native_backend() -> Result<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(gdi::GdiBackend::new()))
}

/// Backend for the current platform
#[cfg(not(windows))]
pub fn native_backend() -> Result<Arc<dyn CaptureBackend>> {
    Err(crate::error::CaptureError::Unsupported)
}
