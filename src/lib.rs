//! # autovoicepack
//!
//! Bulk generation of cloned-voice voice packs for the CrewChief race
//! engineer application.
//!
//! Every phrase of the inventory is synthesized once per variant, passed
//! through an audio effects chain and checked by a [`validate::Validator`]
//! before it is accepted into the output tree. Rejected takes are retried up
//! to a bound, and a batch can be re-run (or sharded over several processes)
//! without redoing finished clips.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::atomic::AtomicBool;
//! use autovoicepack::{
//!     config::GenerationConfig,
//!     effects,
//!     engines::xtts::{XttsServerEngine, XttsServerParams},
//!     pack::generate_voice_pack,
//!     validate,
//! };
//!
//! let config = GenerationConfig::from_json_file("voice.json".as_ref())?;
//! let mut engine = XttsServerEngine::new(XttsServerParams {
//!     base_url: config.synthesis_url.clone(),
//!     ..Default::default()
//! })?;
//! let effects = effects::from_config(config.enable_audio_effects);
//! let validator = validate::from_config(&config.validation, config.request_timeout())?;
//!
//! let summary = generate_voice_pack(
//!     &config,
//!     &mut engine,
//!     effects.as_ref(),
//!     validator.as_ref(),
//!     &AtomicBool::new(false),
//!     &mut rand::thread_rng(),
//! )?;
//! summary.log();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audit;
pub mod config;
pub mod effects;
pub mod engines;
pub mod error;
pub mod inventory;
pub mod item;
pub mod orchestrator;
pub mod pack;
pub mod progress;
pub mod validate;

use std::path::{Path, PathBuf};

pub use error::{GenerateError, SynthesisError};

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug)]
pub struct SynthesisResult {
    /// Raw mono audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio (24000 for XTTS)
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A single request to a voice-cloning synthesis backend.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// Text to speak.
    pub text: &'a str,
    /// Recordings of the speaker whose voice is cloned.
    pub reference_samples: &'a [PathBuf],
    /// Speech speed multiplier.
    pub speed: f32,
    /// Sampling temperature of the model.
    pub temperature: f32,
}

/// Interface to a voice-cloning text-to-speech backend.
///
/// Every error returned from a port is treated as fatal for the batch: a
/// backend that cannot be reached or is misconfigured would fail every
/// remaining phrase the same way.
pub trait SynthesisPort {
    /// Synthesize speech for the request.
    fn synthesize(
        &mut self,
        request: &SynthesisRequest<'_>,
    ) -> Result<SynthesisResult, SynthesisError>;

    /// Synthesize speech and write it to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `SynthesisResult::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        request: &SynthesisRequest<'_>,
        wav_path: &Path,
    ) -> Result<(), SynthesisError> {
        self.synthesize(request)?.write_wav(wav_path)?;
        Ok(())
    }
}
