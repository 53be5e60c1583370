//! OCR engine seam
//!
//! An engine reads a binarized image and reports text with boxes in its own
//! native coordinate space, which may be a rescaled copy of the input. The
//! [`Recognizer`](crate::Recognizer) maps those boxes back.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{OcrError, Result};
use crate::preprocess::BinarizedImage;

/// One piece of recognized text in engine-native coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawText {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Everything an engine reported for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    /// Size of the image the engine actually read
    pub width: u32,
    pub height: u32,
    pub texts: Vec<RawText>,
}

/// Text recognition capability
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recognize text in `image`; blocking
    fn decode(&self, image: &BinarizedImage) -> Result<EngineOutput>;
}

/// Estimate confidence based on text characteristics.
///
/// Windows OCR reports no scores, so the score is a heuristic:
/// - length (longer runs are usually more reliable)
/// - character variety (mixed case, digits alongside letters)
/// - all caps or all digits are frequent misreads
pub fn estimate_confidence(text: &str) -> f32 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }

    // Hundredths, so equal inputs land on exact scores.
    let mut score: i32 = 70;

    // up to +15
    score += (text.chars().count().min(3) * 5) as i32;

    let has_lower = text.chars().any(|c| c.is_lowercase());
    let has_upper = text.chars().any(|c| c.is_uppercase());
    let has_digit = text.chars().any(|c| c.is_numeric());

    if has_lower && has_upper {
        score += 5;
    }
    if has_digit && (has_lower || has_upper) {
        score += 5;
    }

    if text.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) {
        score -= 10;
    }
    if text.chars().all(|c| c.is_numeric()) {
        score -= 15;
    }

    score.clamp(0, 100) as f32 / 100.0
}

struct Script {
    texts: Vec<RawText>,
    native_size: Option<(u32, u32)>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: u64,
}

/// Engine double that replays a fixed answer
///
/// Texts are reported in a native space equal to the input image unless
/// [`with_native_size`](Self::with_native_size) says otherwise.
pub struct ScriptedEngine {
    script: Mutex<Script>,
}

impl ScriptedEngine {
    pub fn new(texts: Vec<RawText>) -> Self {
        Self {
            script: Mutex::new(Script {
                texts,
                native_size: None,
                failure: None,
                delay: None,
                calls: 0,
            }),
        }
    }

    /// Pretend the engine rescaled its input to `width` x `height`
    pub fn with_native_size(self, width: u32, height: u32) -> Self {
        self.script().native_size = Some((width, height));
        self
    }

    /// Make every decode fail with `message`
    pub fn fail_with(&self, message: impl Into<String>) {
        self.script().failure = Some(message.into());
    }

    /// Make every decode block for `delay` first
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.script().delay = delay;
    }

    /// Number of decodes requested so far
    pub fn calls(&self) -> u64 {
        self.script().calls
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn decode(&self, image: &BinarizedImage) -> Result<EngineOutput> {
        let delay = {
            let mut script = self.script();
            script.calls += 1;
            script.delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let script = self.script();
        if let Some(message) = &script.failure {
            return Err(OcrError::ProcessingError(message.clone()));
        }

        let (width, height) = script
            .native_size
            .unwrap_or((image.width(), image.height()));
        trace!("replaying {} texts at {}x{}", script.texts.len(), width, height);
        Ok(EngineOutput {
            width,
            height,
            texts: script.texts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_estimation() {
        assert_eq!(estimate_confidence("Hello"), 0.9);
        assert_eq!(estimate_confidence("HelloWorld123"), 0.95);
        assert_eq!(estimate_confidence("ALLCAPS"), 0.75);
        assert_eq!(estimate_confidence("12345"), 0.6);
        assert!(estimate_confidence("ALLCAPS") < estimate_confidence("Allcaps"));
        assert!(estimate_confidence("12345") < estimate_confidence("ALLCAPS"));
        assert_eq!(estimate_confidence("x"), 0.75);
        assert_eq!(estimate_confidence(""), 0.0);
        assert_eq!(estimate_confidence("   "), 0.0);
    }

    #[test]
    fn test_scripted_engine_reports_input_size() {
        let engine = ScriptedEngine::new(vec![]);
        let image = BinarizedImage::from_mask(3, 2, vec![false; 6]).unwrap();
        let output = engine.decode(&image).unwrap();
        assert_eq!((output.width, output.height), (3, 2));
        assert_eq!(engine.calls(), 1);

        engine.fail_with("engine crashed");
        assert!(matches!(
            engine.decode(&image),
            Err(OcrError::ProcessingError(ref m)) if m == "engine crashed"
        ));
    }
}
