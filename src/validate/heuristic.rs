use std::path::Path;

use super::silence::{silence_threshold_for, SilenceDetector};
use super::{RejectReason, ValidationError, ValidationOutcome, Validator};
use crate::config::ValidationConfig;

/// Rejects clips with long pauses, oversized files or overlong audio.
///
/// The checks run in a fixed order (silence, filesize, duration) and the
/// first failure decides the reason.
pub struct HeuristicValidator {
    detector: Box<dyn SilenceDetector>,
    noise_db: f64,
    max_file_size: u64,
    speaking_rate: f64,
    min_duration_secs: f64,
}

impl HeuristicValidator {
    pub fn from_config(config: &ValidationConfig, detector: Box<dyn SilenceDetector>) -> Self {
        Self {
            detector,
            noise_db: config.silence_noise_db,
            max_file_size: config.max_file_size,
            speaking_rate: config.speaking_rate,
            min_duration_secs: config.min_duration_secs,
        }
    }

    /// Longest acceptable clip for `text`, in seconds.
    ///
    /// Only clips running past this are suspicious.
    pub fn expected_duration(&self, text: &str) -> f64 {
        text.chars().count() as f64 / self.speaking_rate + self.min_duration_secs
    }

    fn has_excess_silence(&self, path: &Path, text: &str) -> Result<bool, ValidationError> {
        let threshold = silence_threshold_for(text);
        let runs = self.detector.silent_runs(path, self.noise_db, threshold)?;
        match runs.iter().find(|&&run| run >= threshold) {
            Some(run) => {
                log::info!(
                    "Excess silence in {}: {run:.2}s (limit {threshold:.2}s)",
                    path.display()
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_oversized(&self, path: &Path) -> Result<bool, ValidationError> {
        let size = std::fs::metadata(path)?.len();
        if size > self.max_file_size {
            log::info!(
                "File too large: {} ({size} > {} bytes)",
                path.display(),
                self.max_file_size
            );
            return Ok(true);
        }
        Ok(false)
    }

    fn is_too_long(&self, path: &Path, text: &str) -> Result<bool, ValidationError> {
        let expected = self.expected_duration(text);
        let actual = wav_duration_secs(path)?;
        if actual > expected {
            log::info!(
                "Audio too long for {text:?}: expected {expected:.2}s, actual {actual:.2}s"
            );
            return Ok(true);
        }
        Ok(false)
    }
}

impl Validator for HeuristicValidator {
    fn validate(
        &self,
        path: &Path,
        source_text: &str,
    ) -> Result<ValidationOutcome, ValidationError> {
        let reason = if self.has_excess_silence(path, source_text)? {
            Some(RejectReason::ExcessiveSilence)
        } else if self.is_oversized(path)? {
            Some(RejectReason::OversizedFile)
        } else if self.is_too_long(path, source_text)? {
            Some(RejectReason::DurationMismatch)
        } else {
            None
        };

        Ok(reason.map_or(ValidationOutcome::Accepted, ValidationOutcome::Rejected))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Duration of a WAV file from its header.
pub fn wav_duration_secs(path: &Path) -> Result<f64, ValidationError> {
    let reader = hound::WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    Ok(reader.duration() as f64 / sample_rate as f64)
}
