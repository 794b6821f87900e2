//! Acceptance checks for generated clips.
//!
//! Two interchangeable strategies implement [`Validator`]:
//!
//! - [`HeuristicValidator`]: silence, filesize and duration checks, in that
//!   order; the first failing check names the rejection.
//! - [`ModelValidator`]: one call to an external integrity classifier.
//!
//! A run uses exactly one of them, chosen by [`from_config`]. Neither ever
//! modifies the file it inspects.

pub mod classifier;
pub mod heuristic;
pub mod silence;

use std::fmt;
use std::path::Path;
use std::time::Duration;

pub use classifier::{Classification, ClassifierError, HttpIntegrityClassifier, IntegrityClassifier};
pub use heuristic::HeuristicValidator;
pub use silence::{FfmpegSilenceDetector, SilenceDetector};

use crate::config::{ValidationConfig, ValidationStrategy};

/// Why a clip was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ExcessiveSilence,
    OversizedFile,
    DurationMismatch,
    IntegrityScoreLow,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ExcessiveSilence => "excessive silence",
            Self::OversizedFile => "oversized file",
            Self::DurationMismatch => "duration mismatch",
            Self::IntegrityScoreLow => "integrity score low",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Failures of the checks themselves. These abort the run; they are never
/// turned into a rejection.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error(
        "ffmpeg not found. Install: Linux: `sudo apt-get install ffmpeg`, \
         macOS: `brew install ffmpeg`, Windows: https://ffmpeg.org/download.html"
    )]
    FfmpegNotFound,
    #[error("Integrity classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Cannot read WAV header: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decides whether a generated clip is acceptable.
pub trait Validator {
    /// Judge the clip at `path`, synthesized from `source_text`.
    fn validate(
        &self,
        path: &Path,
        source_text: &str,
    ) -> Result<ValidationOutcome, ValidationError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Accepts a clip when the integrity classifier is confident enough.
pub struct ModelValidator {
    classifier: Box<dyn IntegrityClassifier>,
    threshold: f32,
}

impl ModelValidator {
    pub fn new(classifier: Box<dyn IntegrityClassifier>, threshold: f32) -> Self {
        Self {
            classifier,
            threshold,
        }
    }
}

impl Validator for ModelValidator {
    fn validate(
        &self,
        path: &Path,
        _source_text: &str,
    ) -> Result<ValidationOutcome, ValidationError> {
        let results = self.classifier.classify(&[path.to_path_buf()])?;
        let result = results
            .first()
            .ok_or(ClassifierError::MissingResult { expected: 1, got: 0 })?;

        if result.confidence < self.threshold {
            log::info!(
                "Integrity score too low for {}: {:.3} < {:.3}",
                path.display(),
                result.confidence,
                self.threshold
            );
            return Ok(ValidationOutcome::Rejected(RejectReason::IntegrityScoreLow));
        }
        Ok(ValidationOutcome::Accepted)
    }

    fn name(&self) -> &'static str {
        "model"
    }
}

/// Build the validator selected by the configuration.
pub fn from_config(
    config: &ValidationConfig,
    request_timeout: Duration,
) -> Result<Box<dyn Validator>, ValidationError> {
    let validator: Box<dyn Validator> = match config.strategy() {
        ValidationStrategy::Model { threshold } => {
            let classifier = HttpIntegrityClassifier::new(&config.classifier_url, request_timeout)?;
            Box::new(ModelValidator::new(Box::new(classifier), threshold))
        }
        ValidationStrategy::Heuristic => Box::new(HeuristicValidator::from_config(
            config,
            Box::new(FfmpegSilenceDetector::default()),
        )),
    };
    log::info!("Validating clips with the {} strategy", validator.name());
    Ok(validator)
}
