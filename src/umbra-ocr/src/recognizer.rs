//! Maps raw engine output onto the captured region

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use umbra_capture::deadline::{run_with_timeout, WorkerError};
use umbra_capture::Rect;

use crate::engine::{EngineOutput, OcrEngine, RawText};
use crate::error::{OcrError, Result};
use crate::preprocess::BinarizedImage;

/// Default bound on a single engine call
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(10);

/// Recognized text with its box relative to the captured region's origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub text: String,
    #[serde(rename = "box")]
    pub bounds: Rect,
    pub confidence: f32,
}

/// Drives an [`OcrEngine`] with a bounded wait
pub struct Recognizer {
    engine: Arc<dyn OcrEngine>,
    timeout: Duration,
    min_confidence: f32,
}

impl Recognizer {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            timeout: DEFAULT_OCR_TIMEOUT,
            min_confidence: 0.0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drop matches scoring below `min_confidence`
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Read text out of `image`, ordered top-to-bottom then left-to-right
    pub fn recognize(&self, image: BinarizedImage) -> Result<Vec<TextMatch>> {
        if image.is_blank() {
            debug!("no foreground in {}x{} region, skipping engine", image.width(), image.height());
            return Ok(Vec::new());
        }

        let (width, height) = (image.width(), image.height());
        let engine = Arc::clone(&self.engine);
        let output = run_with_timeout("ocr", self.timeout, move || engine.decode(&image))
            .map_err(|e| match e {
                WorkerError::Elapsed(after) => OcrError::Timeout(after),
                WorkerError::Failed(message) => OcrError::ProcessingError(message),
            })??;

        let matches = self.map_output(output, width, height)?;
        debug!(
            "{} engine found {} matches in {}x{} region",
            self.engine.name(),
            matches.len(),
            width,
            height
        );
        Ok(matches)
    }

    fn map_output(&self, output: EngineOutput, width: u32, height: u32) -> Result<Vec<TextMatch>> {
        if output.width == 0 || output.height == 0 {
            return Err(OcrError::ProcessingError(format!(
                "engine reported an empty {}x{} image",
                output.width, output.height
            )));
        }

        let sx = width as f32 / output.width as f32;
        let sy = height as f32 / output.height as f32;

        let matches = output
            .texts
            .into_iter()
            .filter(|raw| !raw.text.trim().is_empty())
            .filter_map(|raw| {
                let bounds = scale_box(&raw, sx, sy, width, height)?;
                let confidence = if raw.confidence.is_nan() {
                    0.0
                } else {
                    raw.confidence.clamp(0.0, 1.0)
                };
                Some(TextMatch {
                    text: raw.text,
                    bounds,
                    confidence,
                })
            })
            .filter(|m| m.confidence >= self.min_confidence)
            .collect();

        Ok(reading_order(matches))
    }
}

/// Scale an engine box into image space, rounding outward and clamping
fn scale_box(raw: &RawText, sx: f32, sy: f32, width: u32, height: u32) -> Option<Rect> {
    let clamp = |v: f32, max: u32| -> i32 {
        if v.is_nan() {
            0
        } else {
            v.clamp(0.0, max as f32) as i32
        }
    };

    let left = clamp((raw.x * sx).floor(), width);
    let top = clamp((raw.y * sy).floor(), height);
    let right = clamp(((raw.x + raw.width) * sx).ceil(), width);
    let bottom = clamp(((raw.y + raw.height) * sy).ceil(), height);

    if right <= left || bottom <= top {
        debug!("dropping {:?}: box falls outside the region", raw.text);
        return None;
    }
    Some(Rect::new(left, top, right - left, bottom - top))
}

/// Boxes overlapping vertically by at least half the smaller height share a row
fn same_row(a: &Rect, b: &Rect) -> bool {
    let overlap = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
    overlap > 0 && overlap * 2 >= a.height.min(b.height)
}

fn reading_order(mut matches: Vec<TextMatch>) -> Vec<TextMatch> {
    matches.sort_by_key(|m| (m.bounds.y, m.bounds.x));

    let mut rows: Vec<Vec<TextMatch>> = Vec::new();
    for m in matches {
        match rows.last_mut() {
            Some(row) if same_row(&row[0].bounds, &m.bounds) => row.push(m),
            _ => rows.push(vec![m]),
        }
    }

    rows.into_iter()
        .flat_map(|mut row| {
            row.sort_by_key(|m| m.bounds.x);
            row
        })
        .collect()
}
