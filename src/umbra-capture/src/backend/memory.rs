//! In-memory capture backend
//!
//! Windows are plain RGBA canvases. Used by the test suites and by callers
//! that want the pipeline without a live display.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::{imageops, Rgba, RgbaImage};
use tracing::trace;

use super::CaptureBackend;
use crate::error::{CaptureError, Result};
use crate::pixels::PixelBuffer;
use crate::region::{Rect, Size};
use crate::window::{Surface, WindowId, WindowInfo};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A scripted window: its metadata plus the content its client area renders
pub struct MemoryWindow {
    pub info: WindowInfo,
    pub canvas: RgbaImage,
}

impl MemoryWindow {
    /// A white window of `size` at the screen origin
    pub fn new(id: u64, title: &str, class_name: &str, size: Size) -> Self {
        Self {
            info: WindowInfo {
                id: WindowId(id),
                title: title.to_string(),
                class_name: class_name.to_string(),
                bounds: Rect::new(0, 0, size.width as i32, size.height as i32),
            },
            canvas: RgbaImage::from_pixel(size.width, size.height, BACKGROUND),
        }
    }

    /// Replace the client content; the window takes the canvas's size
    pub fn with_canvas(mut self, canvas: RgbaImage) -> Self {
        self.info.bounds.width = canvas.width() as i32;
        self.info.bounds.height = canvas.height() as i32;
        self.canvas = canvas;
        self
    }
}

struct State {
    desktop: RgbaImage,
    windows: Vec<MemoryWindow>,
    children: Vec<(WindowId, WindowInfo)>,
    denied: HashSet<WindowId>,
    capture_delay: Option<Duration>,
    captures: u64,
}

/// Backend serving [`MemoryWindow`]s in insertion order
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Empty backend whose desktop is a white canvas of `desktop`
    pub fn new(desktop: Size) -> Self {
        Self {
            state: Mutex::new(State {
                desktop: RgbaImage::from_pixel(desktop.width, desktop.height, BACKGROUND),
                windows: Vec::new(),
                children: Vec::new(),
                denied: HashSet::new(),
                capture_delay: None,
                captures: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_window(&self, window: MemoryWindow) {
        self.state().windows.push(window);
    }

    /// Register a child of `parent` occupying `bounds` of the parent's client area
    pub fn add_child(&self, parent: WindowId, child: MemoryWindow, bounds: Rect) {
        let mut info = child.info;
        info.bounds = bounds;
        self.state().children.push((parent, info));
    }

    /// Remove a window and its children, as if it had been closed
    pub fn close_window(&self, id: WindowId) {
        let mut state = self.state();
        state.windows.retain(|w| w.info.id != id);
        state.children.retain(|(parent, _)| *parent != id);
    }

    /// Make captures of `id` fail as protected content
    pub fn deny_access(&self, id: WindowId) {
        self.state().denied.insert(id);
    }

    /// Make every capture block for `delay` before returning
    pub fn set_capture_delay(&self, delay: Option<Duration>) {
        self.state().capture_delay = delay;
    }

    /// Draw on a window's client content
    pub fn paint<F: FnOnce(&mut RgbaImage)>(&self, id: WindowId, f: F) -> Result<()> {
        let mut state = self.state();
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.info.id == id)
            .ok_or(CaptureError::HandleInvalid)?;
        f(&mut window.canvas);
        Ok(())
    }

    /// Draw on the desktop canvas
    pub fn paint_desktop<F: FnOnce(&mut RgbaImage)>(&self, f: F) {
        f(&mut self.state().desktop);
    }

    /// Number of captures served so far
    pub fn capture_count(&self) -> u64 {
        self.state().captures
    }
}

impl CaptureBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn enumerate(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.state().windows.iter().map(|w| w.info.clone()).collect())
    }

    fn enumerate_children(&self, parent: WindowId) -> Result<Vec<WindowInfo>> {
        let state = self.state();
        if !state.windows.iter().any(|w| w.info.id == parent) {
            return Err(CaptureError::HandleInvalid);
        }
        Ok(state
            .children
            .iter()
            .filter(|(p, _)| *p == parent)
            .map(|(_, info)| info.clone())
            .collect())
    }

    fn client_size(&self, surface: Surface) -> Result<Size> {
        let state = self.state();
        let canvas = match surface {
            Surface::Desktop => &state.desktop,
            Surface::Window(id) => state
                .windows
                .iter()
                .find(|w| w.info.id == id)
                .map(|w| &w.canvas)
                .ok_or(CaptureError::HandleInvalid)?,
        };
        Ok(Size::new(canvas.width(), canvas.height()))
    }

    fn capture(&self, surface: Surface, rect: Rect) -> Result<PixelBuffer> {
        let delay = self.state().capture_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        if let Surface::Window(id) = surface {
            if state.denied.contains(&id) {
                return Err(CaptureError::AccessDenied);
            }
        }

        let canvas = match surface {
            Surface::Desktop => &state.desktop,
            Surface::Window(id) => state
                .windows
                .iter()
                .find(|w| w.info.id == id)
                .map(|w| &w.canvas)
                .ok_or(CaptureError::HandleInvalid)?,
        };

        if rect.x < 0
            || rect.y < 0
            || rect.width <= 0
            || rect.height <= 0
            || rect.x as i64 + rect.width as i64 > canvas.width() as i64
            || rect.y as i64 + rect.height as i64 > canvas.height() as i64
        {
            return Err(CaptureError::FrameAcquisition(format!(
                "{} lies outside the {}x{} surface",
                rect,
                canvas.width(),
                canvas.height()
            )));
        }

        let crop = imageops::crop_imm(
            canvas,
            rect.x as u32,
            rect.y as u32,
            rect.width as u32,
            rect.height as u32,
        )
        .to_image();
        let buffer = PixelBuffer::from_rgba_image(&crop);

        state.captures += 1;
        trace!("served capture {} of {:?} {}", state.captures, surface, rect);
        Ok(buffer)
    }
}
