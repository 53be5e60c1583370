//! Windows.Media.Ocr engine

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat};
use tracing::debug;
use windows::{
    core::HSTRING,
    Globalization::Language,
    Graphics::Imaging::{BitmapDecoder, BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::{OcrEngine as WinOcrEngine, OcrLine, OcrResult as WinOcrResult},
    Storage::Streams::{DataWriter, InMemoryRandomAccessStream},
};

use crate::engine::{estimate_confidence, EngineOutput, OcrEngine, RawText};
use crate::error::{OcrError, Result};
use crate::preprocess::BinarizedImage;

/// Windows OCR engine wrapper; reports one [`RawText`] per recognized line
pub struct WindowsOcrEngine {
    engine: WinOcrEngine,
}

impl WindowsOcrEngine {
    /// Create an engine for `language_tag`, or for the user profile languages
    pub fn new(language_tag: Option<&str>) -> Result<Self> {
        debug!("initializing OCR engine");

        let engine = if let Some(tag) = language_tag {
            let lang = Language::CreateLanguage(&HSTRING::from(tag)).map_err(|e| {
                OcrError::EngineInitFailed(format!("invalid language tag '{}': {}", tag, e))
            })?;

            WinOcrEngine::TryCreateFromLanguage(&lang).map_err(|e| {
                OcrError::EngineInitFailed(format!(
                    "failed to create engine for language '{}': {}",
                    tag, e
                ))
            })?
        } else {
            WinOcrEngine::TryCreateFromUserProfileLanguages().map_err(|e| {
                OcrError::EngineInitFailed(format!(
                    "failed to create engine from user profile: {}",
                    e
                ))
            })?
        };

        debug!("OCR engine initialized successfully");
        Ok(Self { engine })
    }

    /// Shrink images past the engine's size limit, keeping the aspect ratio
    fn fit_to_engine(image: GrayImage) -> Result<GrayImage> {
        let limit = WinOcrEngine::MaxImageDimension()?;
        let (width, height) = image.dimensions();
        let longest = width.max(height);
        if longest <= limit {
            return Ok(image);
        }

        let scale = limit as f64 / longest as f64;
        let target_w = ((width as f64 * scale).floor() as u32).max(1);
        let target_h = ((height as f64 * scale).floor() as u32).max(1);
        debug!(
            "downscaling {}x{} to {}x{} for the OCR engine",
            width, height, target_w, target_h
        );
        Ok(imageops::resize(&image, target_w, target_h, FilterType::Triangle))
    }

    /// Route the image through an in-memory PNG into a SoftwareBitmap
    fn to_software_bitmap(image: GrayImage) -> Result<SoftwareBitmap> {
        let mut png_data = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut std::io::Cursor::new(&mut png_data), ImageFormat::Png)?;

        let stream = InMemoryRandomAccessStream::new()
            .map_err(|e| OcrError::ConversionError(format!("failed to create stream: {}", e)))?;
        let writer = DataWriter::CreateDataWriter(&stream)
            .map_err(|e| OcrError::ConversionError(format!("failed to create writer: {}", e)))?;

        writer
            .WriteBytes(&png_data)
            .map_err(|e| OcrError::ConversionError(format!("failed to write bytes: {}", e)))?;
        writer
            .StoreAsync()
            .map_err(|e| OcrError::ConversionError(format!("failed to store: {}", e)))?
            .get()
            .map_err(|e| OcrError::ConversionError(format!("failed to get: {}", e)))?;
        stream
            .Seek(0)
            .map_err(|e| OcrError::ConversionError(format!("failed to seek: {}", e)))?;

        let decoder = BitmapDecoder::CreateAsync(&stream)
            .map_err(|e| OcrError::ConversionError(format!("failed to create decoder: {}", e)))?
            .get()
            .map_err(|e| OcrError::ConversionError(format!("failed to get decoder: {}", e)))?;
        let bitmap = decoder
            .GetSoftwareBitmapAsync()
            .map_err(|e| OcrError::ConversionError(format!("failed to get bitmap async: {}", e)))?
            .get()
            .map_err(|e| OcrError::ConversionError(format!("failed to get bitmap: {}", e)))?;

        // The engine accepts Gray8 and Bgra8 only.
        if bitmap.BitmapPixelFormat()? != BitmapPixelFormat::Gray8 {
            return Ok(SoftwareBitmap::Convert(&bitmap, BitmapPixelFormat::Bgra8)?);
        }
        Ok(bitmap)
    }

    fn line_text(line: &OcrLine) -> Result<Option<RawText>> {
        let text = line.Text()?.to_string();
        let words = line.Words()?;

        let mut bounds: Option<(f32, f32, f32, f32)> = None;
        for i in 0..words.Size()? {
            let r = words.GetAt(i)?.BoundingRect()?;
            let (l, t, rt, b) = (r.X, r.Y, r.X + r.Width, r.Y + r.Height);
            bounds = Some(match bounds {
                Some((l0, t0, r0, b0)) => (l0.min(l), t0.min(t), r0.max(rt), b0.max(b)),
                None => (l, t, rt, b),
            });
        }

        Ok(bounds.map(|(left, top, right, bottom)| RawText {
            confidence: estimate_confidence(&text),
            text,
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }))
    }

    fn parse_result(result: &WinOcrResult) -> Result<Vec<RawText>> {
        let lines = result
            .Lines()
            .map_err(|e| OcrError::ProcessingError(format!("failed to get OCR lines: {}", e)))?;

        let mut texts = Vec::new();
        for i in 0..lines.Size()? {
            if let Some(text) = Self::line_text(&lines.GetAt(i)?)? {
                texts.push(text);
            }
        }
        Ok(texts)
    }
}

impl OcrEngine for WindowsOcrEngine {
    fn name(&self) -> &'static str {
        "windows-media-ocr"
    }

    fn decode(&self, image: &BinarizedImage) -> Result<EngineOutput> {
        let fitted = Self::fit_to_engine(image.to_luma_image())?;
        let (width, height) = fitted.dimensions();
        let bitmap = Self::to_software_bitmap(fitted)?;

        let result = self
            .engine
            .RecognizeAsync(&bitmap)
            .map_err(|e| OcrError::ProcessingError(format!("failed to start OCR: {}", e)))?
            .get()
            .map_err(|e| OcrError::ProcessingError(format!("OCR recognition failed: {}", e)))?;

        let texts = Self::parse_result(&result)?;
        debug!("OCR completed: {} lines at {}x{}", texts.len(), width, height);
        Ok(EngineOutput {
            width,
            height,
            texts,
        })
    }
}
