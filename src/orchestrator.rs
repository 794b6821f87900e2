//! The generate → validate → retry loop.
//!
//! Each [`WorkItem`] moves through `Pending → Attempting → {Accepted,
//! Exhausted}`, or straight to `Skipped` when its clip is already on disk.
//! An exhausted overwrite of an existing clip leaves that clip in place and
//! is reported as `KeptPrevious`.
//! Attempts write to attempt-scoped names (`*.raw.wav`, `*.part.wav`) and only
//! an accepted take is renamed onto the canonical path, so an interrupted run
//! never leaves a half-written clip behind.
//!
//! An exhausted item is logged and recorded; only errors that would break
//! every following item (an unreachable backend, a missing tool) are
//! returned.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::config::GenerationConfig;
use crate::effects::EffectsPort;
use crate::error::GenerateError;
use crate::item::WorkItem;
use crate::validate::{ValidationOutcome, Validator};
use crate::{SynthesisPort, SynthesisRequest};

/// Range the per-run sampling temperature is drawn from when not configured.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.2..=0.3;

/// Knobs of the retry loop, resolved once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub overwrite: bool,
    pub max_attempts: u32,
    pub keep_invalid_files: bool,
    pub speed: f32,
    pub temperature: f32,
}

impl RetrySettings {
    /// Take the settings from `config`, drawing a temperature if none is set.
    pub fn from_config(config: &GenerationConfig, rng: &mut impl Rng) -> Self {
        let temperature = config
            .temperature
            .unwrap_or_else(|| rng.gen_range(TEMPERATURE_RANGE));
        Self {
            overwrite: config.overwrite,
            max_attempts: config.max_attempts,
            keep_invalid_files: config.keep_invalid_files,
            speed: config.speed,
            temperature,
        }
    }
}

/// One synthesize-and-validate cycle of a work item.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAttempt {
    /// 0-based, strictly increasing within an item's loop.
    pub index: u32,
    /// Whether this attempt may replace files already on disk.
    pub overwrite: bool,
    /// The clip this attempt produced, once it exists.
    pub path: Option<PathBuf>,
    pub outcome: Option<ValidationOutcome>,
}

impl GenerationAttempt {
    pub fn first(overwrite: bool) -> Self {
        Self {
            index: 0,
            overwrite,
            path: None,
            outcome: None,
        }
    }

    /// The attempt after a rejection. A rejected take has occupied the
    /// item's paths, so it always overwrites.
    pub fn retry(&self) -> Self {
        Self {
            index: self.index + 1,
            overwrite: true,
            path: None,
            outcome: None,
        }
    }
}

/// How a work item's loop resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The clip already existed and overwriting was not requested.
    Skipped,
    Accepted { attempts: u32 },
    Exhausted { attempts: u32 },
    /// Every overwrite attempt was rejected; the clip from an earlier run is
    /// still in place.
    KeptPrevious { attempts: u32 },
}

/// Counts of a finished (or cancelled) batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchSummary {
    pub generated: usize,
    pub skipped: usize,
    /// Rejected takes across all items.
    pub rejected_attempts: u32,
    /// Clips that never passed validation.
    pub failed: Vec<PathBuf>,
    /// Clips whose regeneration never passed validation, left at their
    /// previous version.
    pub kept_previous: Vec<PathBuf>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn record(&mut self, item: &WorkItem, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Accepted { attempts } => {
                self.generated += 1;
                self.rejected_attempts += attempts - 1;
            }
            ItemOutcome::Exhausted { attempts } => {
                self.rejected_attempts += attempts;
                self.failed.push(item.output_path());
            }
            ItemOutcome::KeptPrevious { attempts } => {
                self.rejected_attempts += attempts;
                self.kept_previous.push(item.output_path());
            }
        }
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.generated += other.generated;
        self.skipped += other.skipped;
        self.rejected_attempts += other.rejected_attempts;
        self.failed.extend(other.failed);
        self.kept_previous.extend(other.kept_previous);
        self.cancelled |= other.cancelled;
    }

    /// Write the end-of-run report to the log.
    pub fn log(&self) {
        log::info!(
            "Generated {} clips, skipped {}, rejected {} takes",
            self.generated,
            self.skipped,
            self.rejected_attempts
        );
        if self.cancelled {
            log::warn!("Run was interrupted before all phrases were considered");
        }
        if !self.failed.is_empty() {
            log::warn!("{} clips failed validation on every attempt:", self.failed.len());
            for path in &self.failed {
                log::warn!("  {}", path.display());
            }
        }
        if !self.kept_previous.is_empty() {
            log::warn!(
                "{} clips could not be regenerated and keep their previous version:",
                self.kept_previous.len()
            );
            for path in &self.kept_previous {
                log::warn!("  {}", path.display());
            }
        }
    }
}

/// Drives work items through synthesis, effects and validation.
pub struct RetryOrchestrator<'a> {
    synthesizer: &'a mut dyn SynthesisPort,
    effects: &'a dyn EffectsPort,
    validator: &'a dyn Validator,
    settings: RetrySettings,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(
        synthesizer: &'a mut dyn SynthesisPort,
        effects: &'a dyn EffectsPort,
        validator: &'a dyn Validator,
        settings: RetrySettings,
    ) -> Self {
        Self {
            synthesizer,
            effects,
            validator,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Process items in order until they run out or `cancel` is raised.
    ///
    /// Cancellation is checked between items; an item in progress always
    /// finishes its current loop.
    pub fn run_batch<I>(
        &mut self,
        items: I,
        cancel: &AtomicBool,
    ) -> Result<BatchSummary, GenerateError>
    where
        I: IntoIterator<Item = WorkItem>,
    {
        let mut summary = BatchSummary::default();
        for item in items {
            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            let outcome = self.process(&item)?;
            summary.record(&item, outcome);
        }
        Ok(summary)
    }

    /// Run one item's attempt loop.
    pub fn process(&mut self, item: &WorkItem) -> Result<ItemOutcome, GenerateError> {
        let target = item.output_path();
        if !self.settings.overwrite && item.exists_on_disk() {
            log::info!("File exists, skipping: {}", target.display());
            return Ok(ItemOutcome::Skipped);
        }

        std::fs::create_dir_all(&item.output_dir)
            .map_err(|e| GenerateError::io(&item.output_dir, e))?;

        let mut attempt = GenerationAttempt::first(self.settings.overwrite);
        loop {
            let outcome = match self.run_attempt(item, &mut attempt) {
                Ok(outcome) => outcome,
                Err(e) => {
                    discard_artifacts(item);
                    return Err(e);
                }
            };

            match outcome {
                ValidationOutcome::Accepted => {
                    log::info!(
                        "Audio file created: {} (attempt {}/{})",
                        target.display(),
                        attempt.index + 1,
                        self.settings.max_attempts
                    );
                    return Ok(ItemOutcome::Accepted {
                        attempts: attempt.index + 1,
                    });
                }
                ValidationOutcome::Rejected(reason) => {
                    log::info!(
                        "Rejected {} on attempt {}/{}: {reason}",
                        target.display(),
                        attempt.index + 1,
                        self.settings.max_attempts
                    );
                }
            }

            if attempt.index + 1 >= self.settings.max_attempts {
                let attempts = attempt.index + 1;
                if target.is_file() {
                    log::warn!(
                        "Failed to regenerate a clean .wav file after {attempts} attempts, \
                         keeping the previous one: {}",
                        target.display()
                    );
                    return Ok(ItemOutcome::KeptPrevious { attempts });
                }
                log::warn!(
                    "Failed to generate a clean .wav file after {attempts} attempts: {}",
                    target.display()
                );
                return Ok(ItemOutcome::Exhausted { attempts });
            }
            attempt = attempt.retry();
        }
    }

    /// Synthesize, post-process and validate one take, then publish or
    /// dispose of it.
    fn run_attempt(
        &mut self,
        item: &WorkItem,
        attempt: &mut GenerationAttempt,
    ) -> Result<ValidationOutcome, GenerateError> {
        let raw = item.raw_path();
        let staging = item.staging_path();
        if attempt.overwrite {
            remove_if_present(&raw)?;
            remove_if_present(&staging)?;
        }

        let request = SynthesisRequest {
            text: &item.text,
            reference_samples: &item.reference_samples,
            speed: self.settings.speed,
            temperature: self.settings.temperature,
        };
        self.synthesizer.synthesize_to_file(&request, &raw)?;
        self.effects.apply(&raw, &staging)?;
        attempt.path = Some(staging.clone());

        let outcome = self.validator.validate(&staging, &item.text)?;
        attempt.outcome = Some(outcome);

        match outcome {
            ValidationOutcome::Accepted => {
                let target = item.output_path();
                std::fs::rename(&staging, &target).map_err(|e| GenerateError::io(&target, e))?;
                attempt.path = Some(target);
            }
            ValidationOutcome::Rejected(_) if self.settings.keep_invalid_files => {
                let invalid = item.invalid_path(attempt.index);
                std::fs::rename(&staging, &invalid).map_err(|e| GenerateError::io(&invalid, e))?;
                attempt.path = Some(invalid);
            }
            ValidationOutcome::Rejected(_) => {
                std::fs::remove_file(&staging).map_err(|e| GenerateError::io(&staging, e))?;
                attempt.path = None;
            }
        }
        Ok(outcome)
    }
}

fn remove_if_present(path: &Path) -> Result<(), GenerateError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GenerateError::io(path, e)),
    }
}

/// Remove a failed attempt's intermediate files so a later run does not
/// mistake them for work in progress.
fn discard_artifacts(item: &WorkItem) {
    for path in [item.raw_path(), item.staging_path()] {
        if let Err(e) = remove_if_present(&path) {
            log::warn!("Could not clean up {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Passthrough;
    use crate::validate::{RejectReason, ValidationError};
    use crate::{SynthesisError, SynthesisResult};
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct CountingSynth {
        calls: usize,
        fail: bool,
    }

    impl CountingSynth {
        fn new() -> Self {
            Self { calls: 0, fail: false }
        }
    }

    impl SynthesisPort for CountingSynth {
        fn synthesize(
            &mut self,
            _request: &SynthesisRequest<'_>,
        ) -> Result<SynthesisResult, SynthesisError> {
            self.calls += 1;
            if self.fail {
                return Err(SynthesisError::Backend {
                    status: 500,
                    body: "model crashed".into(),
                });
            }
            Ok(SynthesisResult {
                samples: vec![0.1; 2_400],
                sample_rate: 24_000,
            })
        }
    }

    /// Hands out scripted verdicts, then accepts everything.
    struct Scripted(RefCell<VecDeque<ValidationOutcome>>);

    impl Scripted {
        fn new(outcomes: impl IntoIterator<Item = ValidationOutcome>) -> Self {
            Self(RefCell::new(outcomes.into_iter().collect()))
        }

        fn rejecting(n: usize) -> Self {
            let rejected = ValidationOutcome::Rejected(RejectReason::OversizedFile);
            Self::new(std::iter::repeat(rejected).take(n))
        }
    }

    impl Validator for Scripted {
        fn validate(&self, path: &Path, _text: &str) -> Result<ValidationOutcome, ValidationError> {
            assert!(path.is_file(), "validator must see the finished clip");
            Ok(self.0.borrow_mut().pop_front().unwrap_or(ValidationOutcome::Accepted))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn settings(max_attempts: u32, keep_invalid_files: bool) -> RetrySettings {
        RetrySettings {
            overwrite: false,
            max_attempts,
            keep_invalid_files,
            speed: 1.2,
            temperature: 0.25,
        }
    }

    fn item(dir: &Path, stem: &str) -> WorkItem {
        WorkItem::new(
            dir.join("voice"),
            stem.to_string(),
            "Push now",
            Arc::from(vec![PathBuf::from("baseline/1.wav")]),
        )
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn existing_clip_is_skipped_without_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        std::fs::create_dir_all(&work.output_dir).unwrap();
        std::fs::write(work.output_path(), b"accepted earlier").unwrap();

        let mut synth = CountingSynth::new();
        let validator = Scripted::new([]);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(3, false));

        assert_eq!(orchestrator.process(&work).unwrap(), ItemOutcome::Skipped);
        drop(orchestrator);
        assert_eq!(synth.calls, 0);
        assert_eq!(std::fs::read(work.output_path()).unwrap(), b"accepted earlier");
    }

    #[test]
    fn in_progress_raw_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        std::fs::create_dir_all(&work.output_dir).unwrap();
        std::fs::write(work.raw_path(), b"").unwrap();

        let mut synth = CountingSynth::new();
        let validator = Scripted::new([]);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(3, false));

        assert_eq!(orchestrator.process(&work).unwrap(), ItemOutcome::Skipped);
        drop(orchestrator);
        assert_eq!(synth.calls, 0);
    }

    #[test]
    fn in_progress_staging_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        std::fs::create_dir_all(&work.output_dir).unwrap();
        std::fs::write(work.staging_path(), b"").unwrap();

        let mut synth = CountingSynth::new();
        let validator = Scripted::new([]);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(3, false));

        assert_eq!(orchestrator.settings().max_attempts, 3);
        assert_eq!(orchestrator.process(&work).unwrap(), ItemOutcome::Skipped);
        drop(orchestrator);
        assert_eq!(synth.calls, 0);
        assert!(work.staging_path().is_file());
    }

    #[test]
    fn overwrite_regenerates_existing_clip() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        std::fs::create_dir_all(&work.output_dir).unwrap();
        std::fs::write(work.output_path(), b"old").unwrap();

        let mut synth = CountingSynth::new();
        let validator = Scripted::new([]);
        let mut config = settings(3, false);
        config.overwrite = true;
        let mut orchestrator = RetryOrchestrator::new(&mut synth, &Passthrough, &validator, config);

        assert_eq!(orchestrator.process(&work).unwrap(), ItemOutcome::Accepted { attempts: 1 });
        drop(orchestrator);
        assert_eq!(synth.calls, 1);
        assert_ne!(std::fs::read(work.output_path()).unwrap(), b"old");
    }

    #[test]
    fn rejected_takes_are_deleted_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        let mut synth = CountingSynth::new();
        let validator = Scripted::rejecting(2);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(5, false));

        assert_eq!(orchestrator.process(&work).unwrap(), ItemOutcome::Accepted { attempts: 3 });
        drop(orchestrator);
        assert_eq!(synth.calls, 3);
        assert_eq!(file_names(&work.output_dir), ["push.wav"]);
    }

    #[test]
    fn rejected_takes_are_kept_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        let mut synth = CountingSynth::new();
        let validator = Scripted::rejecting(2);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(5, true));

        orchestrator.process(&work).unwrap();
        assert_eq!(
            file_names(&work.output_dir),
            ["push.invalid-0.wav", "push.invalid-1.wav", "push.wav"]
        );
    }

    #[test]
    fn exhaustion_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = CountingSynth::new();
        let validator = Scripted::rejecting(3);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(3, false));

        let items = vec![item(dir.path(), "bad"), item(dir.path(), "good")];
        let summary = orchestrator.run_batch(items, &AtomicBool::new(false)).unwrap();
        drop(orchestrator);

        assert_eq!(synth.calls, 4);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.rejected_attempts, 3);
        assert_eq!(summary.failed, vec![dir.path().join("voice/bad.wav")]);
        assert!(!dir.path().join("voice/bad.wav").exists());
        assert!(dir.path().join("voice/good.wav").is_file());
    }

    #[test]
    fn failed_regeneration_keeps_the_previous_clip() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        std::fs::create_dir_all(&work.output_dir).unwrap();
        std::fs::write(work.output_path(), b"accepted earlier").unwrap();

        let mut synth = CountingSynth::new();
        let validator = Scripted::rejecting(2);
        let mut overwrite = settings(2, false);
        overwrite.overwrite = true;
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, overwrite);

        let summary = orchestrator
            .run_batch(vec![work.clone()], &AtomicBool::new(false))
            .unwrap();
        drop(orchestrator);

        assert_eq!(synth.calls, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.kept_previous, vec![work.output_path()]);
        assert_eq!(summary.rejected_attempts, 2);
        assert_eq!(std::fs::read(work.output_path()).unwrap(), b"accepted earlier");
    }

    #[test]
    fn whitespace_text_is_still_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = item(dir.path(), "blank");
        work.text = "   ".into();
        let mut synth = CountingSynth::new();
        let validator = Scripted::new([]);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(2, false));

        assert_eq!(orchestrator.process(&work).unwrap(), ItemOutcome::Accepted { attempts: 1 });
    }

    #[test]
    fn backend_failure_aborts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let work = item(dir.path(), "push");
        let mut synth = CountingSynth::new();
        synth.fail = true;
        let validator = Scripted::new([]);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(3, false));

        let items = vec![work.clone(), item(dir.path(), "next")];
        let err = orchestrator
            .run_batch(items, &AtomicBool::new(false))
            .expect_err("backend failure is fatal");
        drop(orchestrator);

        assert!(matches!(err, GenerateError::Synthesis(_)));
        assert_eq!(synth.calls, 1);
        assert!(!work.exists_on_disk());
    }

    #[test]
    fn cancellation_stops_before_the_next_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = CountingSynth::new();
        let validator = Scripted::new([]);
        let mut orchestrator =
            RetryOrchestrator::new(&mut synth, &Passthrough, &validator, settings(3, false));

        let summary = orchestrator
            .run_batch(vec![item(dir.path(), "a")], &AtomicBool::new(true))
            .unwrap();
        drop(orchestrator);

        assert!(summary.cancelled);
        assert_eq!(synth.calls, 0);
    }

    #[test]
    fn retry_forces_overwrite_and_advances_index() {
        let first = GenerationAttempt::first(false);
        let second = first.retry();
        assert_eq!(second.index, 1);
        assert!(second.overwrite);
        assert_eq!(second.retry().index, 2);
    }

    #[test]
    fn temperature_is_drawn_when_unset() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let config = GenerationConfig::default();
        let settings = RetrySettings::from_config(&config, &mut rng);
        assert!(TEMPERATURE_RANGE.contains(&settings.temperature));

        let pinned = GenerationConfig {
            temperature: Some(0.3),
            ..Default::default()
        };
        assert_eq!(RetrySettings::from_config(&pinned, &mut rng).temperature, 0.3);
    }
}
