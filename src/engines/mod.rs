//! Speech synthesis backends.
//!
//! # Available Engines
//!
//! - [`xtts::XttsServerEngine`] - multilingual XTTS voice cloning served over HTTP

pub mod xtts;

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::{SynthesisError, SynthesisResult};

/// Every `.wav` recording in `dir`, sorted by name.
///
/// An empty or missing directory is a configuration error for the whole
/// batch: there is no voice to clone.
pub fn reference_samples(dir: &Path) -> Result<Vec<PathBuf>, SynthesisError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SynthesisError::MissingReferenceSamples(dir.to_path_buf()));
        }
        Err(e) => return Err(SynthesisError::Io(e)),
    };

    let mut samples = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("wav") {
            samples.push(path);
        }
    }

    if samples.is_empty() {
        return Err(SynthesisError::MissingReferenceSamples(dir.to_path_buf()));
    }
    samples.sort();
    log::info!("Found {} reference samples in {}", samples.len(), dir.display());
    Ok(samples)
}

/// Fail unless there is at least one reference sample and all of them exist.
pub fn check_reference_samples(samples: &[PathBuf]) -> Result<(), SynthesisError> {
    if samples.is_empty() {
        return Err(SynthesisError::MissingReferenceSamples(PathBuf::new()));
    }
    if let Some(missing) = samples.iter().find(|p| !p.is_file()) {
        return Err(SynthesisError::ReferenceSampleNotFound(missing.clone()));
    }
    Ok(())
}

/// Decode an in-memory WAV file into mono f32 samples.
///
/// Integer PCM is scaled to `[-1, 1]`; multi-channel audio is averaged down
/// to one channel.
pub fn decode_wav(bytes: &[u8]) -> Result<SynthesisResult, SynthesisError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(SynthesisResult {
        samples,
        sample_rate: spec.sample_rate,
    })
}
