//! Raw pixel buffers handed from the acquirer to the output stages

use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte order of one pixel inside a [`PixelBuffer`] row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    Bgra,
    Rgba,
    Bgr,
    Rgb,
}

impl ChannelOrder {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ChannelOrder::Bgra | ChannelOrder::Rgba => 4,
            ChannelOrder::Bgr | ChannelOrder::Rgb => 3,
        }
    }

    /// Read one pixel as `[r, g, b, a]`; three-channel layouts report opaque alpha
    #[inline]
    pub fn to_rgba(self, px: &[u8]) -> [u8; 4] {
        match self {
            ChannelOrder::Bgra => [px[2], px[1], px[0], px[3]],
            ChannelOrder::Rgba => [px[0], px[1], px[2], px[3]],
            ChannelOrder::Bgr => [px[2], px[1], px[0], 255],
            ChannelOrder::Rgb => [px[0], px[1], px[2], 255],
        }
    }
}

/// Ways a pixel buffer's declared layout can disagree with its bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("buffer has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("stride {stride} is shorter than a {width}px row of {bytes_per_pixel}-byte pixels")]
    StrideTooShort {
        stride: usize,
        width: u32,
        bytes_per_pixel: usize,
    },

    #[error("expected {expected} bytes (stride x height), got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Raw capture result: `height` rows of `stride` bytes, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub channel_order: ChannelOrder,
    pub bytes: Vec<u8>,
}

impl PixelBuffer {
    /// Verify that dimensions, stride and byte length agree
    pub fn check_layout(&self) -> Result<(), LayoutError> {
        if self.width == 0 || self.height == 0 {
            return Err(LayoutError::ZeroDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let bytes_per_pixel = self.channel_order.bytes_per_pixel();
        let min_stride = (self.width as usize).checked_mul(bytes_per_pixel);
        if min_stride.map_or(true, |min| self.stride < min) {
            return Err(LayoutError::StrideTooShort {
                stride: self.stride,
                width: self.width,
                bytes_per_pixel,
            });
        }

        let expected = self
            .stride
            .checked_mul(self.height as usize)
            .unwrap_or(usize::MAX);
        if self.bytes.len() != expected {
            return Err(LayoutError::LengthMismatch {
                expected,
                actual: self.bytes.len(),
            });
        }

        Ok(())
    }

    /// Iterate rows with stride padding removed. Call [`check_layout`](Self::check_layout) first.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let row_len = self.width as usize * self.channel_order.bytes_per_pixel();
        self.bytes
            .chunks_exact(self.stride)
            .map(move |row| &row[..row_len])
    }

    /// Pixel at (`x`, `y`) as `[r, g, b, a]`
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.channel_order.bytes_per_pixel();
        let offset = y as usize * self.stride + x as usize * bpp;
        self.channel_order.to_rgba(&self.bytes[offset..offset + bpp])
    }

    /// Copy into a tightly packed RGBA image
    pub fn to_rgba_image(&self) -> Result<RgbaImage, LayoutError> {
        self.check_layout()?;
        Ok(ImageBuffer::from_fn(self.width, self.height, |x, y| {
            Rgba(self.rgba_at(x, y))
        }))
    }

    /// Build a tightly packed BGRA buffer from an RGBA image
    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let mut bytes = Vec::with_capacity(image.as_raw().len());
        for px in image.pixels() {
            let [r, g, b, a] = px.0;
            bytes.extend_from_slice(&[b, g, r, a]);
        }
        Self {
            width: image.width(),
            height: image.height(),
            stride: image.width() as usize * 4,
            channel_order: ChannelOrder::Bgra,
            bytes,
        }
    }
}
