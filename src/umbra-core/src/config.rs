//! Configuration management
//!
//! TOML file with a base configuration and named profiles. A profile section
//! replaces the matching base section wholesale.
//!
//! ```toml
//! [target]
//! title = "001 - VMware Workstation"
//! child_class = "MKSWindow#0"
//!
//! [ocr]
//! default_threshold = 220
//!
//! [profiles.desktop.target]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use umbra_capture::WindowTarget;
use umbra_ocr::{OcrThreshold, Polarity, PreprocessOptions};

use crate::error::ConfigError;

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub capture: CaptureConfig,
    pub ocr: OcrConfig,

    /// Named profiles that can override base config
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, ProfileConfig>,
}

/// Which window to capture; all fields empty means the whole display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub title: Option<String>,
    pub class: Option<String>,
    /// Child window whose origin caller coordinates are relative to
    pub child_title: Option<String>,
    pub child_class: Option<String>,
}

impl TargetConfig {
    pub fn window_target(&self) -> WindowTarget {
        WindowTarget::new(self.title.clone(), self.class.clone())
    }

    pub fn child_target(&self) -> Option<WindowTarget> {
        let child = WindowTarget::new(self.child_title.clone(), self.child_class.clone());
        (!child.is_desktop()).then_some(child)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bound on a single pixel acquisition
    pub timeout_ms: u64,
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// OCR language tag (e.g., "en-US"); user profile languages when unset
    pub language: Option<String>,
    pub timeout_ms: u64,
    pub min_confidence: f32,
    pub window_radius: u32,
    pub polarity: Polarity,
    pub despeckle: bool,
    pub default_threshold: u8,
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn preprocess_options(&self) -> PreprocessOptions {
        PreprocessOptions {
            window_radius: self.window_radius,
            polarity: self.polarity,
            despeckle: self.despeckle,
        }
    }

    pub fn default_threshold(&self) -> OcrThreshold {
        OcrThreshold(self.default_threshold)
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        let preprocess = PreprocessOptions::default();
        Self {
            language: None,
            timeout_ms: 10_000,
            min_confidence: 0.0,
            window_radius: preprocess.window_radius,
            polarity: preprocess.polarity,
            despeckle: preprocess.despeckle,
            default_threshold: OcrThreshold::DEFAULT.0,
        }
    }
}

/// Profile for overriding settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub target: Option<TargetConfig>,
    pub capture: Option<CaptureConfig>,
    pub ocr: Option<OcrConfig>,
}

impl Config {
    /// `<config dir>/Umbra/umbra.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("Umbra").join("umbra.toml"))
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!("loaded config from {:?}", path);
        Ok(config)
    }

    /// Load `path`, or the default file when it exists, or built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(path),
                None => {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Apply a named profile, merging settings
    ///
    /// Profile sections override base sections.
    pub fn apply_profile(mut self, profile_name: &str) -> Result<Self, ConfigError> {
        let profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| ConfigError::UnknownProfile(profile_name.to_string()))?
            .clone();

        if let Some(target) = profile.target {
            self.target = target;
        }
        if let Some(capture) = profile.capture {
            self.capture = capture;
        }
        if let Some(ocr) = profile.ocr {
            self.ocr = ocr;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.timeout_ms == 0 {
            return Err(ConfigError::Invalid("capture.timeout_ms must be positive".into()));
        }
        if self.ocr.timeout_ms == 0 {
            return Err(ConfigError::Invalid("ocr.timeout_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.ocr.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "ocr.min_confidence must be within 0..=1, got {}",
                self.ocr.min_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[target]
title = "001 - VMware Workstation"
child_class = "MKSWindow#0"

[capture]
timeout_ms = 2500

[ocr]
language = "en-US"
polarity = "darker"
default_threshold = 230

[profiles.desktop.target]

[profiles.strict.ocr]
min_confidence = 0.6
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.target.window_target().is_desktop());
        assert_eq!(config.target.child_target(), None);
        assert_eq!(config.capture.timeout(), Duration::from_secs(5));
        assert_eq!(config.ocr.timeout(), Duration::from_secs(10));
        assert_eq!(config.ocr.preprocess_options(), PreprocessOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(SAMPLE);
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(
            config.target.window_target(),
            WindowTarget::titled("001 - VMware Workstation")
        );
        assert_eq!(
            config.target.child_target(),
            Some(WindowTarget::new(None, Some("MKSWindow#0".into())))
        );
        assert_eq!(config.capture.timeout_ms, 2500);
        assert_eq!(config.ocr.polarity, Polarity::Darker);
        assert_eq!(config.ocr.default_threshold(), OcrThreshold(230));
        // Unset fields keep their defaults.
        assert_eq!(config.ocr.window_radius, 7);
        assert_eq!(config.profiles.len(), 2);
    }

    #[test]
    fn test_apply_profile() {
        let file = write_config(SAMPLE);
        let base = Config::from_file(file.path()).unwrap();

        let desktop = base.clone().apply_profile("desktop").unwrap();
        assert!(desktop.target.window_target().is_desktop());
        assert_eq!(desktop.ocr, base.ocr);

        let strict = base.clone().apply_profile("strict").unwrap();
        assert_eq!(strict.ocr.min_confidence, 0.6);
        assert_eq!(strict.target, base.target);

        assert!(matches!(
            base.apply_profile("missing"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config("[capture]\ntimeout_ms = 0\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let file = write_config("[ocr\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(Some(dir.path().join("absent.toml").as_path())),
            Err(ConfigError::Read { .. })
        ));
    }
}
