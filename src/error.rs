use std::path::PathBuf;

use crate::config::ConfigError;
use crate::effects::EffectsError;
use crate::inventory::InventoryError;
use crate::validate::ValidationError;

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("No reference voice samples found in {0}. Record a baseline for this voice first.")]
    MissingReferenceSamples(PathBuf),
    #[error("Reference voice sample does not exist: {0}")]
    ReferenceSampleNotFound(PathBuf),
    #[error("Synthesis server unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Synthesis server returned {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid WAV data: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a whole generation run.
///
/// A rejected or exhausted phrase is never one of these; only conditions that
/// would invalidate every following phrase are.
#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("Audio effects failed: {0}")]
    Effects(#[from] EffectsError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
