//! Run configuration.
//!
//! A [`GenerationConfig`] carries every knob of a batch. It can be built in
//! code through [`GenerationConfigBuilder`], loaded from a JSON file, and is
//! finally overridden by command-line flags in the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Highest variant index that still maps to a single lowercase letter.
pub const MAX_VARIATION_COUNT: u32 = 25;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which acceptance strategy a run uses. The two are never combined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationStrategy {
    /// Silence, filesize and duration heuristics.
    Heuristic,
    /// A single call to the integrity classifier.
    Model { threshold: f32 },
}

/// Settings for the quality validator.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Validate with the integrity classifier instead of the heuristics.
    pub use_model: bool,
    /// Minimum classifier confidence. `None` disables the model strategy.
    pub model_threshold: Option<f32>,
    /// Endpoint of the integrity classifier service.
    #[builder(setter(into))]
    pub classifier_url: String,
    /// Largest acceptable clip in bytes.
    pub max_file_size: u64,
    /// Generous speaking rate in characters per second.
    pub speaking_rate: f64,
    /// Fixed allowance added to the expected duration, in seconds.
    pub min_duration_secs: f64,
    /// Level below which audio counts as silence, in dB.
    pub silence_noise_db: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            use_model: false,
            model_threshold: Some(0.9),
            classifier_url: "http://127.0.0.1:8021/classify".to_string(),
            max_file_size: 1_000_000,
            speaking_rate: 3.0,
            min_duration_secs: 1.5,
            silence_noise_db: -50.0,
        }
    }
}

impl ValidationConfig {
    /// Resolve the active strategy.
    ///
    /// The model is used only when it is requested and a threshold is set;
    /// everything else falls back to the heuristics.
    pub fn strategy(&self) -> ValidationStrategy {
        match (self.use_model, self.model_threshold) {
            (true, Some(threshold)) => ValidationStrategy::Model { threshold },
            (true, None) => {
                log::warn!("Model validation requested without a threshold, using heuristics");
                ValidationStrategy::Heuristic
            }
            _ => ValidationStrategy::Heuristic,
        }
    }
}

/// Everything a generation run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct GenerationConfig {
    /// Name of the voice; also the output directory name.
    #[builder(setter(into))]
    pub voice_name: String,
    /// The voice name as the TTS engine should pronounce it.
    #[builder(setter(into, strip_option))]
    pub voice_name_tts: Option<String>,
    /// Listener name substituted for the `YOUR_NAME` placeholder.
    #[builder(setter(into))]
    pub your_name: String,
    #[builder(setter(into))]
    pub output_root: PathBuf,
    /// Directory holding one sub-directory of reference recordings per voice.
    #[builder(setter(into))]
    pub baseline_dir: PathBuf,
    #[builder(setter(into))]
    pub inventory_path: PathBuf,
    /// Extra variants per phrase. `0` writes unsuffixed filenames.
    pub variation_count: u32,
    pub overwrite: bool,
    pub max_attempts: u32,
    /// Keep rejected takes as `*.invalid-N.wav` instead of deleting them.
    pub keep_invalid_files: bool,
    pub enable_audio_effects: bool,
    pub enable_text_replacements: bool,
    pub original_inventory_order: bool,
    pub skip_inventory: bool,
    pub skip_radio_check: bool,
    pub speed: f32,
    /// Sampling temperature. Drawn once per run from [0.2, 0.3] when unset.
    #[builder(setter(strip_option))]
    pub temperature: Option<f32>,
    /// Version written to the attribution file. Defaults to today's date.
    #[builder(setter(into, strip_option))]
    pub voicepack_version: Option<String>,
    #[builder(setter(into))]
    pub synthesis_url: String,
    /// Timeout applied to each HTTP request made by the backends.
    pub request_timeout_secs: u64,
    /// Minimum time between two progress samples.
    pub progress_interval_secs: u64,
    pub validation: ValidationConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            voice_name: String::new(),
            voice_name_tts: None,
            your_name: String::new(),
            output_root: PathBuf::from("./output"),
            baseline_dir: PathBuf::from("./output/baseline"),
            inventory_path: PathBuf::from("./phrase_inventory.csv"),
            variation_count: 2,
            overwrite: false,
            max_attempts: 30,
            keep_invalid_files: false,
            enable_audio_effects: true,
            enable_text_replacements: true,
            original_inventory_order: false,
            skip_inventory: false,
            skip_radio_check: false,
            speed: 1.2,
            temperature: None,
            voicepack_version: None,
            synthesis_url: "http://127.0.0.1:8020".to_string(),
            request_timeout_secs: 120,
            progress_interval_secs: 30,
            validation: ValidationConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Reject values the pipeline cannot work with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.voice_name.is_empty() {
            return Err(ConfigError::Invalid("voice_name must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.variation_count > MAX_VARIATION_COUNT {
            return Err(ConfigError::Invalid(format!(
                "variation_count {} exceeds {MAX_VARIATION_COUNT} (one letter per variant)",
                self.variation_count
            )));
        }
        if self.progress_interval_secs == 0 {
            return Err(ConfigError::Invalid("progress_interval_secs must be at least 1".into()));
        }
        if self.validation.speaking_rate <= 0.0 {
            return Err(ConfigError::Invalid("speaking_rate must be positive".into()));
        }
        if let Some(threshold) = self.validation.model_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid(format!(
                    "model_threshold {threshold} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Root of this voice's output tree.
    pub fn voice_dir(&self) -> PathBuf {
        self.output_root.join(&self.voice_name)
    }

    /// Directory of reference recordings for this voice.
    pub fn reference_dir(&self) -> PathBuf {
        self.baseline_dir.join(&self.voice_name)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Name the engine should speak, falling back to the voice name.
    pub fn spoken_voice_name(&self) -> &str {
        self.voice_name_tts.as_deref().unwrap_or(&self.voice_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_attempts, 30);
        assert_eq!(config.variation_count, 2);
        assert_eq!(config.progress_interval(), Duration::from_secs(30));
        assert_eq!(config.validation.max_file_size, 1_000_000);
        assert_eq!(config.validation.model_threshold, Some(0.9));
        assert_eq!(config.validation.strategy(), ValidationStrategy::Heuristic);
    }

    #[test]
    fn model_strategy_needs_flag_and_threshold() {
        let mut validation = ValidationConfig {
            use_model: true,
            ..Default::default()
        };
        assert_eq!(
            validation.strategy(),
            ValidationStrategy::Model { threshold: 0.9 }
        );

        validation.model_threshold = None;
        assert_eq!(validation.strategy(), ValidationStrategy::Heuristic);
    }

    #[test]
    fn builder_fills_unset_fields_with_defaults() {
        let config = GenerationConfigBuilder::default()
            .voice_name("mercury")
            .variation_count(0)
            .build()
            .expect("builder should succeed");
        assert_eq!(config.voice_name, "mercury");
        assert_eq!(config.variation_count, 0);
        assert_eq!(config.max_attempts, 30);
        assert_eq!(config.voice_dir(), PathBuf::from("./output/mercury"));
    }

    #[test]
    fn json_keeps_defaults_for_missing_keys() {
        let config: GenerationConfig = serde_json::from_str(
            r#"{"voice_name": "luis", "validation": {"use_model": true}}"#,
        )
        .expect("valid json");
        assert_eq!(config.voice_name, "luis");
        assert_eq!(config.speed, 1.2);
        assert!(config.validation.use_model);
        assert_eq!(config.validation.speaking_rate, 3.0);
    }

    #[test]
    fn check_rejects_unusable_values() {
        let mut config = GenerationConfig {
            voice_name: "luis".into(),
            ..Default::default()
        };
        assert!(config.check().is_ok());

        config.max_attempts = 0;
        assert!(config.check().is_err());

        config.max_attempts = 2;
        config.variation_count = 26;
        assert!(config.check().is_err());

        config.variation_count = 1;
        config.validation.model_threshold = Some(1.5);
        assert!(config.check().is_err());
    }
}
