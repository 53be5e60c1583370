//! Screenshot sessions
//!
//! A [`Screenshot`] resolves its target once at construction and then serves
//! bitmap and shadow-text requests against it. Calls on one session are
//! serialized. When a capture reports that the window is gone, the handle is
//! dropped and the next call resolves the target again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use umbra_capture::window::scope_bounds;
use umbra_capture::{
    native_backend, Acquirer, CaptureBackend, PixelBuffer, Rect, RegionValidator, Size,
    WindowHandle, WindowLocator, WindowTarget,
};
use umbra_ocr::{native_engine, OcrEngine, OcrError, OcrThreshold, Recognizer, ShadowPreprocessor, TextMatch};
use umbra_processing::{BitmapBlob, BitmapEncoder};

use crate::config::Config;
use crate::error::{Result, ScreenshotError};

enum Reader {
    Ready(Recognizer),
    /// The engine could not be created; OCR calls report why
    Unavailable(String),
}

/// A capture session bound to one window target
pub struct Screenshot {
    target: WindowTarget,
    child: Option<WindowTarget>,
    backend: Arc<dyn CaptureBackend>,
    locator: WindowLocator,
    validator: RegionValidator,
    acquirer: Acquirer,
    encoder: BitmapEncoder,
    preprocessor: ShadowPreprocessor,
    reader: Reader,
    handle: Mutex<Option<WindowHandle>>,
}

impl Screenshot {
    /// Open a session on the platform's capture backend and OCR engine.
    ///
    /// An OCR engine that fails to initialize does not fail construction;
    /// bitmap capture still works and OCR calls return the init error.
    pub fn new(config: &Config) -> Result<Self> {
        let backend = native_backend()?;
        let engine = match native_engine(config.ocr.language.as_deref()) {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("OCR unavailable: {}", e);
                None
            }
        };
        Self::with_parts(config, backend, engine)
    }

    /// Open a session on explicit capture and OCR implementations
    pub fn with_parts(
        config: &Config,
        backend: Arc<dyn CaptureBackend>,
        engine: Option<Arc<dyn OcrEngine>>,
    ) -> Result<Self> {
        let target = config.target.window_target();
        let child = config.target.child_target();
        let locator = WindowLocator::new(Arc::clone(&backend));

        let handle = locator.resolve_scoped(&target, child.as_ref())?;

        let reader = match engine {
            Some(engine) => Reader::Ready(
                Recognizer::new(engine)
                    .with_timeout(config.ocr.timeout())
                    .with_min_confidence(config.ocr.min_confidence),
            ),
            None => Reader::Unavailable("no OCR engine configured".to_string()),
        };

        info!(
            "session opened on {} via {} backend",
            target,
            backend.name()
        );

        Ok(Self {
            validator: RegionValidator::new(Arc::clone(&backend)),
            acquirer: Acquirer::with_timeout(Arc::clone(&backend), config.capture.timeout()),
            encoder: BitmapEncoder::new(),
            preprocessor: ShadowPreprocessor::new(config.ocr.preprocess_options()),
            target,
            child,
            backend,
            locator,
            reader,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Target this session was opened on
    pub fn target(&self) -> &WindowTarget {
        &self.target
    }

    /// Capture a region as a 24-bit BMP
    pub fn take_bmp(&self, x: i32, y: i32, width: i32, height: i32) -> Result<BitmapBlob> {
        self.with_handle(|handle| {
            let buffer = self.capture(handle, Rect::new(x, y, width, height))?;
            Ok(self.encoder.encode(buffer)?)
        })
    }

    /// Capture a region as unencoded pixels
    pub fn take_raw(&self, x: i32, y: i32, width: i32, height: i32) -> Result<PixelBuffer> {
        self.with_handle(|handle| self.capture(handle, Rect::new(x, y, width, height)))
    }

    /// Read faint text in a region; boxes are relative to the region's origin
    pub fn ocr_shadow_text(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        threshold: impl Into<OcrThreshold>,
    ) -> Result<Vec<TextMatch>> {
        let threshold = threshold.into();

        self.with_handle(|handle| {
            let rect = self.validator.validate(handle, Rect::new(x, y, width, height))?;
            let recognizer = match &self.reader {
                Reader::Ready(recognizer) => recognizer,
                Reader::Unavailable(reason) => {
                    return Err(ScreenshotError::Recognition(OcrError::EngineInitFailed(
                        reason.clone(),
                    )))
                }
            };
            let buffer = self.acquirer.acquire(handle, rect)?;
            let image = self.preprocessor.preprocess(buffer, threshold)?;
            Ok(recognizer.recognize(image)?)
        })
    }

    /// Current size of the capturable area
    pub fn bounds(&self) -> Result<Size> {
        self.with_handle(|handle| {
            let scope = scope_bounds(self.backend.as_ref(), handle)?;
            Ok(Size::new(scope.width.max(0) as u32, scope.height.max(0) as u32))
        })
    }

    /// Release the resolved handle; a later call resolves the target again
    pub fn close(&self) {
        match self.lock().take() {
            Some(handle) => info!(
                "session on {} closed, released {:?}",
                self.target,
                handle.surface()
            ),
            None => debug!("session on {} holds no handle", self.target),
        }
    }

    fn capture(&self, handle: &WindowHandle, rect: Rect) -> Result<PixelBuffer> {
        let rect = self.validator.validate(handle, rect)?;
        Ok(self.acquirer.acquire(handle, rect)?)
    }

    fn lock(&self) -> MutexGuard<'_, Option<WindowHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` on a live handle, resolving again if the last one went stale
    fn with_handle<T>(&self, op: impl FnOnce(&WindowHandle) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();

        let handle = match guard.take() {
            Some(handle) => handle,
            None => {
                debug!("re-resolving {}", self.target);
                self.locator
                    .resolve_scoped(&self.target, self.child.as_ref())?
            }
        };

        let result = op(&handle);
        match &result {
            Err(e) if e.invalidates_handle() => {
                warn!("handle for {} is no longer valid, dropping it", self.target);
            }
            _ => *guard = Some(handle),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use image::{ImageFormat, Rgba};
    use std::time::Duration;
    use umbra_capture::backend::memory::{MemoryBackend, MemoryWindow};
    use umbra_capture::{CaptureError, WindowId};
    use umbra_ocr::{RawText, ScriptedEngine};

    fn config(title: &str) -> Config {
        Config {
            target: TargetConfig {
                title: Some(title.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn backend() -> Arc<MemoryBackend> {
        let backend = MemoryBackend::new(Size::new(1920, 1080));
        backend.add_window(MemoryWindow::new(1, "Game", "GameFrame", Size::new(800, 600)));
        Arc::new(backend)
    }

    fn session(backend: &Arc<MemoryBackend>, engine: Option<Arc<ScriptedEngine>>) -> Screenshot {
        Screenshot::with_parts(
            &config("Game"),
            backend.clone(),
            engine.map(|e| e as Arc<dyn OcrEngine>),
        )
        .unwrap()
    }

    /// Draws a faint 20x6 bar at (100, 50) in window 1
    fn paint_shadow_text(backend: &MemoryBackend) {
        backend
            .paint(WindowId(1), |canvas| {
                for y in 50..56 {
                    for x in 100..120 {
                        canvas.put_pixel(x, y, Rgba([250, 250, 250, 255]));
                    }
                }
            })
            .unwrap();
    }

    #[test]
    fn test_take_bmp_decodes_to_requested_size() {
        let backend = backend();
        let shot = session(&backend, None);
        let blob = shot.take_bmp(0, 0, 500, 500).unwrap();

        let decoded = image::load_from_memory_with_format(blob.as_bytes(), ImageFormat::Bmp).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 500));
    }

    #[test]
    fn test_sequential_captures_are_identical() {
        let backend = backend();
        let shot = session(&backend, None);
        let first = shot.take_bmp(10, 20, 64, 48).unwrap();
        let second = shot.take_bmp(10, 20, 64, 48).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.capture_count(), 2);
    }

    #[test]
    fn test_nonexistent_window_is_not_found() {
        let result = Screenshot::with_parts(&config("nonexistent-xyz"), backend(), None);
        assert!(matches!(result, Err(ScreenshotError::NotFound(_))));
    }

    #[test]
    fn test_out_of_bounds_region_is_invalid() {
        let backend = backend();
        let shot = session(&backend, None);
        for (x, y, w, h) in [(0, 0, 0, 10), (-1, 0, 10, 10), (700, 0, 101, 10), (0, 0, 800, 601)] {
            assert!(matches!(
                shot.take_bmp(x, y, w, h),
                Err(ScreenshotError::InvalidRegion { .. })
            ));
        }
        assert_eq!(backend.capture_count(), 0);
    }

    #[test]
    fn test_raw_capture_is_bgra() {
        let backend = backend();
        backend
            .paint(WindowId(1), |c| c.put_pixel(5, 5, Rgba([1, 2, 3, 255])))
            .unwrap();
        let shot = session(&backend, None);
        let raw = shot.take_raw(5, 5, 2, 2).unwrap();
        assert_eq!(&raw.bytes[..4], &[3, 2, 1, 255]);
        assert_eq!(shot.bounds().unwrap(), Size::new(800, 600));
    }

    #[test]
    fn test_empty_region_yields_no_text() {
        let backend = backend();
        let engine = Arc::new(ScriptedEngine::new(vec![RawText {
            text: "phantom".into(),
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 5.0,
            confidence: 1.0,
        }]));
        let shot = session(&backend, Some(engine.clone()));

        let matches = shot.ocr_shadow_text(0, 0, 200, 100, 255).unwrap();
        assert!(matches.is_empty());
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_shadow_text_is_read_with_local_boxes() {
        let backend = backend();
        paint_shadow_text(&backend);
        let engine = Arc::new(ScriptedEngine::new(vec![RawText {
            text: "HP 100".into(),
            x: 20.0,
            y: 10.0,
            width: 20.0,
            height: 6.0,
            confidence: 0.9,
        }]));
        let shot = session(&backend, Some(engine.clone()));

        let matches = shot.ocr_shadow_text(80, 40, 100, 40, 250).unwrap();
        assert_eq!(engine.calls(), 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "HP 100");
        assert_eq!(matches[0].bounds, Rect::new(20, 10, 20, 6));
    }

    #[test]
    fn test_ocr_without_engine_is_a_recognition_error() {
        let backend = backend();
        paint_shadow_text(&backend);
        let shot = session(&backend, None);
        assert!(matches!(
            shot.ocr_shadow_text(80, 40, 100, 40, 250),
            Err(ScreenshotError::Recognition(_))
        ));
    }

    #[test]
    fn test_region_is_checked_before_engine_availability() {
        let backend = backend();
        let shot = session(&backend, None);
        assert!(matches!(
            shot.ocr_shadow_text(700, 0, 200, 40, 250),
            Err(ScreenshotError::InvalidRegion { .. })
        ));
        assert_eq!(backend.capture_count(), 0);
    }

    #[test]
    fn test_close_releases_the_handle() {
        let backend = backend();
        let shot = session(&backend, None);
        shot.close();

        // Replaced while released: the next call resolves the new window
        // instead of failing on the old handle.
        backend.close_window(WindowId(1));
        backend.add_window(MemoryWindow::new(9, "Game", "GameFrame", Size::new(400, 300)));
        assert!(shot.take_bmp(0, 0, 10, 10).is_ok());
        assert_eq!(shot.bounds().unwrap(), Size::new(400, 300));

        shot.close();
        shot.close();
    }

    #[test]
    fn test_closed_window_is_resolved_again() {
        let backend = backend();
        let shot = session(&backend, None);
        backend.close_window(WindowId(1));

        let err = shot.take_bmp(0, 0, 10, 10).unwrap_err();
        assert!(matches!(err, ScreenshotError::Capture(CaptureError::HandleInvalid)));

        // Still gone: resolution fails.
        assert!(matches!(
            shot.take_bmp(0, 0, 10, 10),
            Err(ScreenshotError::NotFound(_))
        ));

        // Reopened under a new id: the session finds it.
        backend.add_window(MemoryWindow::new(9, "Game", "GameFrame", Size::new(400, 300)));
        assert!(shot.take_bmp(0, 0, 10, 10).is_ok());
        assert_eq!(shot.bounds().unwrap(), Size::new(400, 300));
    }

    #[test]
    fn test_hung_capture_and_engine_time_out() {
        let backend = backend();
        paint_shadow_text(&backend);
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let mut config = config("Game");
        config.capture.timeout_ms = 20;
        config.ocr.timeout_ms = 20;
        let shot = Screenshot::with_parts(
            &config,
            backend.clone(),
            Some(engine.clone() as Arc<dyn OcrEngine>),
        )
        .unwrap();

        engine.set_delay(Some(Duration::from_millis(500)));
        assert!(matches!(
            shot.ocr_shadow_text(80, 40, 100, 40, 250),
            Err(ScreenshotError::Timeout {
                operation: "text recognition",
                ..
            })
        ));

        backend.set_capture_delay(Some(Duration::from_millis(500)));
        assert!(matches!(
            shot.take_bmp(0, 0, 10, 10),
            Err(ScreenshotError::Timeout {
                operation: "window capture",
                ..
            })
        ));
    }

    #[test]
    fn test_child_scope_coordinates() {
        let backend = backend();
        backend.add_child(
            WindowId(1),
            MemoryWindow::new(2, "", "Console", Size::new(100, 80)),
            Rect::new(40, 30, 100, 80),
        );
        backend
            .paint(WindowId(1), |c| c.put_pixel(41, 31, Rgba([9, 8, 7, 255])))
            .unwrap();

        let mut config = config("Game");
        config.target.child_class = Some("Console".into());
        let shot = Screenshot::with_parts(&config, backend.clone(), None).unwrap();

        assert_eq!(shot.bounds().unwrap(), Size::new(100, 80));
        let raw = shot.take_raw(1, 1, 1, 1).unwrap();
        assert_eq!(raw.rgba_at(0, 0), [9, 8, 7, 255]);
        assert!(matches!(
            shot.take_raw(0, 0, 101, 10),
            Err(ScreenshotError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn test_child_scope_is_clipped_to_parent() {
        let backend = MemoryBackend::new(Size::new(1920, 1080));
        backend.add_window(MemoryWindow::new(1, "Game", "GameFrame", Size::new(200, 100)));
        backend.add_child(
            WindowId(1),
            MemoryWindow::new(2, "", "Console", Size::new(100, 80)),
            Rect::new(150, 50, 100, 80),
        );
        let backend = Arc::new(backend);

        let mut config = config("Game");
        config.target.child_class = Some("Console".into());
        let shot = Screenshot::with_parts(&config, backend.clone(), None).unwrap();

        assert_eq!(shot.bounds().unwrap(), Size::new(50, 50));
        assert!(matches!(
            shot.take_bmp(0, 0, 60, 60),
            Err(ScreenshotError::InvalidRegion { .. })
        ));
        assert_eq!(backend.capture_count(), 0);
        assert!(shot.take_bmp(0, 0, 50, 50).is_ok());
    }

    #[test]
    fn test_session_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Screenshot>();
    }
}
