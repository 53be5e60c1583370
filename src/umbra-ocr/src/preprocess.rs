//! Shadow-text binarization
//!
//! Shadow text is drawn a few luminance levels away from its background, far
//! too faint for a global threshold. Each pixel is instead compared with the
//! mean luminance of its neighbourhood:
//!
//! 1. `Y = (299 R + 587 G + 114 B) / 1000`, alpha ignored
//! 2. background `B` is the mean of `Y` over a `(2r + 1)²` window clipped to
//!    the image, read from an integral image
//! 3. the required contrast is `Δ(t) = 1 + round((255 - t) * 63 / 255)`
//! 4. a pixel is foreground when its contrast against `B` in the configured
//!    polarity is at least `Δ(t)`
//! 5. optionally, foreground pixels with no 8-connected foreground neighbour
//!    are dropped
//!
//! `Δ` only shrinks as `t` grows and the speckle pass only looks at
//! neighbours, so raising the threshold never removes a foreground pixel.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use serde::{Deserialize, Serialize};
use tracing::debug;
use umbra_capture::PixelBuffer;

use crate::error::Result;

const FOREGROUND: Luma<u8> = Luma([0]);
const BACKGROUND: Luma<u8> = Luma([255]);

/// Sensitivity dial for shadow-text detection; higher admits fainter text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OcrThreshold(pub u8);

impl OcrThreshold {
    pub const DEFAULT: OcrThreshold = OcrThreshold(200);

    /// Luminance difference a pixel needs against its background
    pub fn required_contrast(self) -> u32 {
        let slack = 255 - self.0 as u32;
        1 + (slack * 63 + 127) / 255
    }
}

impl Default for OcrThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for OcrThreshold {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// Which side of the background counts as ink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Any,
    Darker,
    Lighter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Neighbourhood radius `r` of the background window
    pub window_radius: u32,
    pub polarity: Polarity,
    /// Drop isolated foreground pixels
    pub despeckle: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            window_radius: 7,
            polarity: Polarity::Any,
            despeckle: true,
        }
    }
}

/// Foreground mask of a captured region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarizedImage {
    width: u32,
    height: u32,
    mask: Vec<bool>,
}

impl BinarizedImage {
    /// Build from a row-major mask; `None` if the length does not match
    pub fn from_mask(width: u32, height: u32, mask: Vec<bool>) -> Option<Self> {
        (mask.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            mask,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && self.mask[y as usize * self.width as usize + x as usize]
    }

    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|&&on| on).count()
    }

    pub fn is_blank(&self) -> bool {
        !self.mask.iter().any(|&on| on)
    }

    /// Black ink on a white page, the layout OCR engines expect
    pub fn to_luma_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.is_foreground(x, y) {
                FOREGROUND
            } else {
                BACKGROUND
            }
        })
    }
}

/// Per-pixel luminance, alpha ignored
fn luminance(rgba: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, _] = rgba.get_pixel(x, y).0;
        Luma([((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8])
    })
}

/// Turns captured regions into foreground masks
#[derive(Debug, Clone, Default)]
pub struct ShadowPreprocessor {
    options: PreprocessOptions,
}

impl ShadowPreprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    pub fn preprocess(&self, buffer: PixelBuffer, threshold: OcrThreshold) -> Result<BinarizedImage> {
        let luma = luminance(&buffer.to_rgba_image()?);
        drop(buffer);

        let (width, height) = luma.dimensions();
        let integral = integral_image::<_, u64>(&luma);
        let radius = self.options.window_radius;
        let delta = threshold.required_contrast() as i64;

        let mut mask = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let y0 = y.saturating_sub(radius);
            let y1 = y.saturating_add(radius).min(height - 1);
            for x in 0..width {
                let x0 = x.saturating_sub(radius);
                let x1 = x.saturating_add(radius).min(width - 1);
                let count = ((x1 - x0 + 1) as i64) * ((y1 - y0 + 1) as i64);
                let sum = sum_image_pixels(&integral, x0, y0, x1, y1)[0] as i64;

                // Compare `Y - mean` against delta without dividing.
                let diff = luma.get_pixel(x, y).0[0] as i64 * count - sum;
                let needed = delta * count;
                mask.push(match self.options.polarity {
                    Polarity::Any => diff.abs() >= needed,
                    Polarity::Darker => -diff >= needed,
                    Polarity::Lighter => diff >= needed,
                });
            }
        }

        let (width, height) = (width as usize, height as usize);
        if self.options.despeckle {
            mask = despeckle(&mask, width, height);
        }

        let image = BinarizedImage {
            width: width as u32,
            height: height as u32,
            mask,
        };
        debug!(
            "binarized {}x{} region at threshold {} (contrast {}): {} foreground pixels",
            width,
            height,
            threshold.0,
            delta,
            image.foreground_count()
        );
        Ok(image)
    }
}

fn despeckle(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    let has_neighbour = |x: usize, y: usize| {
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                if (nx, ny) != (x, y) && mask[ny * width + nx] {
                    return true;
                }
            }
        }
        false
    };

    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| mask[y * width + x] && has_neighbour(x, y))
        .collect()
}
