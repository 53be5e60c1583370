//! Pixel acquisition for validated regions

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::CaptureBackend;
use crate::deadline::{run_with_timeout, WorkerError};
use crate::error::{CaptureError, Result};
use crate::pixels::PixelBuffer;
use crate::region::Rect;
use crate::window::{scope_bounds, WindowHandle};

/// Default bound on a single acquisition
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Copies fresh pixels out of a resolved window on every call
pub struct Acquirer {
    backend: Arc<dyn CaptureBackend>,
    timeout: Duration,
}

impl Acquirer {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self::with_timeout(backend, DEFAULT_CAPTURE_TIMEOUT)
    }

    pub fn with_timeout(backend: Arc<dyn CaptureBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Capture `rect`, given in the handle's scope coordinates.
    ///
    /// The rectangle is expected to have passed the region validator. A
    /// backend that hands back a buffer of any other size is treated as a
    /// failed capture.
    pub fn acquire(&self, handle: &WindowHandle, rect: Rect) -> Result<PixelBuffer> {
        let backend = Arc::clone(&self.backend);
        let surface = handle.surface();
        let scoped = handle.child().is_some();

        // Child scopes move with their parent, so the offset is read at capture time.
        let origin = if scoped {
            let bounds = scope_bounds(self.backend.as_ref(), handle)?;
            (bounds.x, bounds.y)
        } else {
            (0, 0)
        };
        let client_rect = rect.translate(origin.0, origin.1).ok_or_else(|| {
            CaptureError::InvalidRegion {
                rect,
                reason: "offset by child origin overflows".to_string(),
            }
        })?;

        debug!(
            "acquiring {} from {:?} via {} backend",
            client_rect,
            surface,
            backend.name()
        );

        let buffer = run_with_timeout("capture", self.timeout, move || {
            backend.capture(surface, client_rect)
        })
        .map_err(|e| match e {
            WorkerError::Elapsed(after) => CaptureError::Timeout {
                operation: "window capture",
                after,
            },
            WorkerError::Failed(message) => CaptureError::FrameAcquisition(message),
        })??;

        if buffer.width != rect.width as u32 || buffer.height != rect.height as u32 {
            warn!(
                "backend returned {}x{} for a {} request",
                buffer.width, buffer.height, rect
            );
            return Err(CaptureError::FrameAcquisition(format!(
                "expected {}x{} pixels, backend returned {}x{}",
                rect.width, rect.height, buffer.width, buffer.height
            )));
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, MemoryWindow};
    use crate::region::Size;
    use crate::window::{WindowId, WindowLocator, WindowTarget};
    use image::Rgba;

    fn setup() -> (Arc<MemoryBackend>, WindowHandle) {
        let backend = Arc::new(MemoryBackend::new(Size::new(640, 480)));
        backend.add_window(MemoryWindow::new(1, "Frame", "Outer", Size::new(200, 100)));
        backend.add_child(
            WindowId(1),
            MemoryWindow::new(2, "", "Inner", Size::new(50, 50)),
            Rect::new(30, 20, 50, 50),
        );
        backend
            .paint(WindowId(1), |canvas| {
                canvas.put_pixel(31, 21, Rgba([200, 100, 50, 255]));
            })
            .unwrap();

        let child = WindowTarget::new(None, Some("Inner".into()));
        let handle = WindowLocator::new(backend.clone())
            .resolve_scoped(&WindowTarget::titled("Frame"), Some(&child))
            .unwrap();
        (backend, handle)
    }

    #[test]
    fn test_child_scope_rect_is_offset_into_parent() {
        let (backend, handle) = setup();
        let acquirer = Acquirer::new(backend);
        let buffer = acquirer.acquire(&handle, Rect::new(0, 0, 4, 4)).unwrap();
        assert_eq!(buffer.rgba_at(1, 1), [200, 100, 50, 255]);
    }

    #[test]
    fn test_every_call_reacquires() {
        let (backend, handle) = setup();
        let acquirer = Acquirer::new(backend.clone());
        acquirer.acquire(&handle, Rect::new(0, 0, 4, 4)).unwrap();
        acquirer.acquire(&handle, Rect::new(0, 0, 4, 4)).unwrap();
        assert_eq!(backend.capture_count(), 2);
    }

    #[test]
    fn test_closed_window_reports_invalid_handle() {
        let (backend, handle) = setup();
        backend.close_window(WindowId(1));
        let err = Acquirer::new(backend)
            .acquire(&handle, Rect::new(0, 0, 4, 4))
            .unwrap_err();
        assert!(err.invalidates_handle());
    }

    #[test]
    fn test_hung_backend_times_out() {
        let (backend, handle) = setup();
        backend.set_capture_delay(Some(Duration::from_millis(500)));
        let acquirer = Acquirer::with_timeout(backend, Duration::from_millis(20));
        assert!(matches!(
            acquirer.acquire(&handle, Rect::new(0, 0, 4, 4)),
            Err(CaptureError::Timeout { .. })
        ));
    }
}
