//! Post-processing of raw synthesis output.
//!
//! The radio-style effects chain runs in `sox`; when effects are disabled
//! the raw file is moved into place untouched.

use std::path::Path;
use std::process::{Command, Stdio};

#[derive(thiserror::Error, Debug)]
pub enum EffectsError {
    #[error(
        "sox not found. Install: Linux: `sudo apt-get install sox`, \
         macOS: `brew install sox`, Windows: https://sourceforge.net/projects/sox/"
    )]
    SoxNotFound,
    #[error("sox failed on {path}: {stderr}")]
    SoxFailed { path: String, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a raw waveform file into a finished clip.
pub trait EffectsPort {
    /// Produce `finished` from `raw`. On success `raw` no longer exists.
    fn apply(&self, raw: &Path, finished: &Path) -> Result<(), EffectsError>;
}

/// Keeps the raw audio as the finished clip.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl EffectsPort for Passthrough {
    fn apply(&self, raw: &Path, finished: &Path) -> Result<(), EffectsError> {
        std::fs::rename(raw, finished)?;
        Ok(())
    }
}

/// Motorsport radio call processing through `sox`.
///
/// Slight gain reduction, an EQ that thins out the lows and lifts the
/// presence band, mild overdrive, silence trimmed from both ends, then
/// normalisation. Background noise is left to CrewChief, which overlays its
/// own.
#[derive(Debug, Clone)]
pub struct SoxEffects {
    program: String,
}

impl Default for SoxEffects {
    fn default() -> Self {
        Self {
            program: "sox".to_string(),
        }
    }
}

/// `(frequency Hz, width, gain dB)` for each equalizer band.
const EQ_BANDS: &[(&str, &str, &str)] = &[
    ("100", "0.5q", "-12"),
    ("200", "0.5q", "-6"),
    ("300", "0.5q", "-3"),
    ("3000", "0.5q", "6"),
    ("6000", "0.5q", "4"),
    ("10000", "0.5q", "3"),
];

impl SoxEffects {
    /// Use a specific sox binary instead of the one on PATH.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Effect arguments that follow the input and output file names.
    pub fn effect_args() -> Vec<&'static str> {
        let mut args = vec!["gain", "-3"];
        for &(freq, width, gain) in EQ_BANDS {
            args.extend_from_slice(&["equalizer", freq, width, gain]);
        }
        args.extend_from_slice(&[
            "overdrive", "7", "12",
            // trim leading silence, then trailing silence via reverse
            "silence", "1", "0.1", "0.1%", "reverse",
            "silence", "1", "0.1", "0.3%", "reverse",
            "norm", "-1",
        ]);
        args
    }
}

impl EffectsPort for SoxEffects {
    fn apply(&self, raw: &Path, finished: &Path) -> Result<(), EffectsError> {
        let output = Command::new(&self.program)
            .args(["-V1", "-q"])
            .arg(raw)
            .arg(finished)
            .args(Self::effect_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EffectsError::SoxNotFound
                } else {
                    EffectsError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EffectsError::SoxFailed {
                path: raw.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        std::fs::remove_file(raw)?;
        log::debug!("Applied effects: {} -> {}", raw.display(), finished.display());
        Ok(())
    }
}

/// Pick the effects port for a run.
pub fn from_config(enable_audio_effects: bool) -> Box<dyn EffectsPort> {
    if enable_audio_effects {
        Box::new(SoxEffects::default())
    } else {
        Box::new(Passthrough)
    }
}
