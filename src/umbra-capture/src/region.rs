//! Capture rectangles and their validation against a window's bounds

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::CaptureBackend;
use crate::error::{CaptureError, Result};
use crate::window::{scope_bounds, WindowHandle};

/// A region in window-client coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, `None` on overflow
    pub fn right(&self) -> Option<i32> {
        self.x.checked_add(self.width)
    }

    /// Exclusive bottom edge, `None` on overflow
    pub fn bottom(&self) -> Option<i32> {
        self.y.checked_add(self.height)
    }

    /// Shift the rectangle by an offset, keeping its size
    pub fn translate(&self, dx: i32, dy: i32) -> Option<Rect> {
        Some(Rect {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
            ..*self
        })
    }

    /// Overlap with `other`; zero-sized when the two do not meet
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let bottom = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
        Rect {
            x,
            y,
            width: (right - x as i64).max(0) as i32,
            height: (bottom - y as i64).max(0) as i32,
        }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Dimensions of a capturable surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Check `rect` against a surface of `bounds`.
///
/// Returns the rectangle unchanged when it lies fully inside; anything that
/// starts outside, has a non-positive dimension, or spills past an edge is
/// rejected. Regions are never clamped.
pub fn validate_region(rect: Rect, bounds: Size) -> Result<Rect> {
    let reject = |reason: String| CaptureError::InvalidRegion { rect, reason };

    if rect.width <= 0 || rect.height <= 0 {
        return Err(reject("width and height must be positive".to_string()));
    }
    if rect.x < 0 || rect.y < 0 {
        return Err(reject("origin must not be negative".to_string()));
    }

    let right = rect
        .right()
        .ok_or_else(|| reject("horizontal extent overflows".to_string()))?;
    let bottom = rect
        .bottom()
        .ok_or_else(|| reject("vertical extent overflows".to_string()))?;

    if right as i64 > bounds.width as i64 {
        return Err(reject(format!(
            "right edge {} exceeds width {}",
            right, bounds.width
        )));
    }
    if bottom as i64 > bounds.height as i64 {
        return Err(reject(format!(
            "bottom edge {} exceeds height {}",
            bottom, bounds.height
        )));
    }

    Ok(rect)
}

/// Validates caller rectangles against the live bounds of a resolved window
pub struct RegionValidator {
    backend: Arc<dyn CaptureBackend>,
}

impl RegionValidator {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Read the handle's current bounds and validate `rect` against them
    pub fn validate(&self, handle: &WindowHandle, rect: Rect) -> Result<Rect> {
        let bounds = scope_bounds(self.backend.as_ref(), handle)?;
        debug!("validating {} against {}x{}", rect, bounds.width, bounds.height);
        validate_region(
            rect,
            Size::new(bounds.width.max(0) as u32, bounds.height.max(0) as u32),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: Size = Size::new(800, 600);

    fn assert_invalid(rect: Rect) {
        match validate_region(rect, BOUNDS) {
            Err(CaptureError::InvalidRegion { rect: rejected, .. }) => assert_eq!(rejected, rect),
            other => panic!("expected InvalidRegion for {}, got {:?}", rect, other),
        }
    }

    #[test]
    fn test_intersect() {
        let client = Rect::new(0, 0, 200, 100);
        assert_eq!(Rect::new(150, 50, 100, 80).intersect(&client), Rect::new(150, 50, 50, 50));
        assert_eq!(Rect::new(-20, -10, 50, 40).intersect(&client), Rect::new(0, 0, 30, 30));
        assert_eq!(Rect::new(10, 10, 20, 20).intersect(&client), Rect::new(10, 10, 20, 20));

        let outside = Rect::new(300, 0, 50, 50).intersect(&client);
        assert_eq!((outside.width, outside.height), (0, 50));
        assert_eq!(outside.area(), 0);
    }

    #[test]
    fn test_valid_regions_pass_unchanged() {
        for rect in [
            Rect::new(0, 0, 800, 600),
            Rect::new(0, 0, 1, 1),
            Rect::new(799, 599, 1, 1),
            Rect::new(100, 50, 500, 500),
        ] {
            assert_eq!(validate_region(rect, BOUNDS).unwrap(), rect);
        }
    }

    #[test]
    fn test_regions_past_an_edge_are_rejected_not_clamped() {
        assert_invalid(Rect::new(1, 0, 800, 600));
        assert_invalid(Rect::new(0, 1, 800, 600));
        assert_invalid(Rect::new(700, 0, 101, 10));
        assert_invalid(Rect::new(0, 590, 10, 11));
    }

    #[test]
    fn test_non_positive_dimensions_and_negative_origin() {
        assert_invalid(Rect::new(0, 0, 0, 10));
        assert_invalid(Rect::new(0, 0, 10, -1));
        assert_invalid(Rect::new(-1, 0, 10, 10));
        assert_invalid(Rect::new(0, -5, 10, 10));
    }

    #[test]
    fn test_overflowing_extent_is_rejected() {
        assert_invalid(Rect::new(i32::MAX, 0, 10, 10));
        assert_invalid(Rect::new(0, i32::MAX - 1, 1, 5));
    }

    #[test]
    fn test_translate() {
        let rect = Rect::new(10, 20, 30, 40);
        assert_eq!(rect.translate(5, -5), Some(Rect::new(15, 15, 30, 40)));
        assert_eq!(rect.translate(i32::MAX, 0), None);
        assert_eq!(rect.to_string(), "30x40+10+20");
    }
}
