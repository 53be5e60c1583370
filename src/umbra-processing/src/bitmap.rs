//! Windows BMP encoding
//!
//! Output is always a 24-bit, uncompressed (`BI_RGB`) bitmap with a
//! `BITMAPFILEHEADER` and `BITMAPINFOHEADER`, written by `image`'s BMP
//! encoder. Rows are stored bottom-up and padded to a multiple of four bytes;
//! pixels are stored as B, G, R. Source stride padding is skipped and alpha
//! is dropped.

use image::codecs::bmp::BmpEncoder;
use image::{ExtendedColorType, RgbImage};
use tracing::debug;
use umbra_capture::PixelBuffer;

use crate::error::{EncodeError, Result};

const PIXEL_DATA_OFFSET: u32 = 14 + 40;

/// An encoded bitmap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapBlob(Vec<u8>);

impl BitmapBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Width and height as recorded in the info header
    pub fn dimensions(&self) -> (u32, u32) {
        let read_i32 = |at: usize| {
            i32::from_le_bytes([self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]])
        };
        (read_i32(18).unsigned_abs(), read_i32(22).unsigned_abs())
    }
}

impl AsRef<[u8]> for BitmapBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Padded length of one stored row
fn row_len(width: u32) -> Option<u32> {
    width.checked_mul(3)?.checked_add(3).map(|n| n & !3)
}

/// Serializes pixel buffers into BMP files
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmapEncoder;

impl BitmapEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode `buffer`. Identical input always yields identical bytes.
    pub fn encode(&self, buffer: PixelBuffer) -> Result<BitmapBlob> {
        buffer.check_layout()?;

        let too_large = || EncodeError::TooLarge {
            width: buffer.width,
            height: buffer.height,
        };
        let file_len = row_len(buffer.width)
            .and_then(|row| row.checked_mul(buffer.height))
            .and_then(|image| image.checked_add(PIXEL_DATA_OFFSET))
            .ok_or_else(too_large)?;
        i32::try_from(buffer.width).map_err(|_| too_large())?;
        i32::try_from(buffer.height).map_err(|_| too_large())?;

        let bpp = buffer.channel_order.bytes_per_pixel();
        let mut rgb = Vec::with_capacity(buffer.width as usize * buffer.height as usize * 3);
        for row in buffer.rows() {
            for px in row.chunks_exact(bpp) {
                let [r, g, b, _] = buffer.channel_order.to_rgba(px);
                rgb.extend_from_slice(&[r, g, b]);
            }
        }
        let image = RgbImage::from_raw(buffer.width, buffer.height, rgb).ok_or_else(too_large)?;

        let mut out = Vec::with_capacity(file_len as usize);
        BmpEncoder::new(&mut out)
            .encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
            .map_err(|e| EncodeError::Encoder(e.to_string()))?;

        debug!(
            "encoded {}x{} bitmap ({} bytes)",
            buffer.width,
            buffer.height,
            out.len()
        );
        Ok(BitmapBlob(out))
    }
}
