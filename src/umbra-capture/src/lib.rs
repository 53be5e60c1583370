//! umbra-capture - Window location and pixel acquisition for Umbra
//!
//! Resolves window targets to handles, validates capture regions against a
//! window's client area, and copies pixels out of windows that may be covered
//! by others or sitting in the background.

pub mod acquire;
pub mod backend;
pub mod deadline;
pub mod error;
pub mod pixels;
pub mod region;
pub mod window;

pub use acquire::{Acquirer, DEFAULT_CAPTURE_TIMEOUT};
pub use backend::{native_backend, CaptureBackend};
pub use error::CaptureError;
pub use pixels::{ChannelOrder, LayoutError, PixelBuffer};
pub use region::{validate_region, Rect, RegionValidator, Size};
pub use window::{Surface, WindowHandle, WindowId, WindowInfo, WindowLocator, WindowTarget};
