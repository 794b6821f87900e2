//! Whole voice pack generation: inventory phrases, radio check clips and
//! the files CrewChief expects next to them.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use crate::config::GenerationConfig;
use crate::effects::EffectsPort;
use crate::engines::reference_samples;
use crate::error::GenerateError;
use crate::inventory::{default_replacement_rules, filter_entry, load_inventory, shuffle};
use crate::item::{join_relative, variant_stem, PhraseEntry, WorkItem};
use crate::orchestrator::{BatchSummary, RetryOrchestrator, RetrySettings};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::validate::Validator;
use crate::SynthesisPort;

pub const SUBTITLES_FILE: &str = "subtitles.csv";
pub const ATTRIBUTION_FILE: &str = "CREATED_BY.txt";

/// Generate every clip of a voice pack.
///
/// Returns the combined summary of the inventory and radio check phases.
/// Phrases that never validate are listed in the summary; only fatal
/// conditions are returned as errors.
pub fn generate_voice_pack(
    config: &GenerationConfig,
    synthesizer: &mut dyn SynthesisPort,
    effects: &dyn EffectsPort,
    validator: &dyn Validator,
    cancel: &AtomicBool,
    rng: &mut impl Rng,
) -> Result<BatchSummary, GenerateError> {
    config.check()?;
    let references: Arc<[PathBuf]> = reference_samples(&config.reference_dir())?.into();
    let settings = RetrySettings::from_config(config, rng);
    let voice_dir = config.voice_dir();
    let mut orchestrator = RetryOrchestrator::new(synthesizer, effects, validator, settings);
    let settings = orchestrator.settings();
    log::info!(
        "Voice '{}': speed {}, temperature {:.3}, up to {} attempts per clip",
        config.voice_name,
        settings.speed,
        settings.temperature,
        settings.max_attempts
    );
    let mut summary = BatchSummary::default();

    if !config.skip_inventory {
        let entries = load_inventory(&config.inventory_path)?;
        if !entries.is_empty() {
            std::fs::create_dir_all(&voice_dir).map_err(|e| GenerateError::io(&voice_dir, e))?;
            write_attribution(&voice_dir, &config.voice_name, config.voicepack_version.as_deref())?;
        }

        let rules = if config.enable_text_replacements {
            default_replacement_rules(&config.your_name)?
        } else {
            Vec::new()
        };
        let mut entries: Vec<PhraseEntry> = entries
            .into_iter()
            .map(|entry| filter_entry(entry, &config.your_name, &rules, rng))
            .collect();
        if !config.original_inventory_order {
            shuffle(&mut entries, rng);
        }

        let expected = entries.len() * (config.variation_count as usize + 1);
        let tracker = ProgressTracker::new(
            &voice_dir,
            vec![radio_check_dir(config)],
            expected,
            Instant::now(),
        );
        let reporter = ProgressReporter::spawn(tracker, config.progress_interval());
        let items = entries
            .iter()
            .flat_map(|entry| entry.work_items(&voice_dir, config.variation_count, &references));
        let result = orchestrator.run_batch(items, cancel);
        reporter.finish();
        summary.merge(result?);
        log::info!(
            "All entries in {} have been considered",
            config.inventory_path.display()
        );

        let written = write_subtitles(&voice_dir, &entries, config.variation_count)?;
        log::info!("Created {written} subtitles.csv files");
    }

    if !config.skip_radio_check && !summary.cancelled {
        log::info!("Generating radio check audio clips...");
        let items = radio_check_items(config, &references);
        summary.merge(orchestrator.run_batch(items, cancel)?);
    }

    Ok(summary)
}

/// Write the provenance note at the root of the voice pack.
pub fn write_attribution(
    voice_dir: &Path,
    voice_name: &str,
    version: Option<&str>,
) -> Result<PathBuf, GenerateError> {
    let version = version
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d").to_string());
    let path = voice_dir.join(ATTRIBUTION_FILE);
    let text = format!(
        "This voice pack was created using autovoicepack\n\
         \n\
         ...for use with the virtual race engineer application CrewChief\n\
         (https://thecrewchief.org/)\n\
         (https://gitlab.com/mr_belowski/CrewChiefV4)\n\
         \n\
         Voice name: {voice_name}\n\
         Version {version}\n"
    );
    std::fs::write(&path, text).map_err(|e| GenerateError::io(&path, e))?;
    log::info!(
        "Attribution file written to {} for voice pack '{voice_name}' version {version}",
        path.display()
    );
    Ok(path)
}

/// Write a `subtitles.csv` into every phrase directory that lacks one.
///
/// Each row maps a clip filename to its subtitle, one row per variant.
/// Existing files are left alone so hand edits survive a re-run. Returns the
/// number of files written.
pub fn write_subtitles(
    voice_dir: &Path,
    entries: &[PhraseEntry],
    variation_count: u32,
) -> Result<usize, GenerateError> {
    let mut by_dir: BTreeMap<&str, Vec<&PhraseEntry>> = BTreeMap::new();
    for entry in entries {
        by_dir.entry(entry.path()).or_default().push(entry);
    }

    let mut written = 0;
    for (relative, dir_entries) in by_dir {
        let dir = join_relative(voice_dir, relative);
        let path = dir.join(SUBTITLES_FILE);
        if path.is_file() {
            log::debug!("Skipping {} since it exists", path.display());
            continue;
        }
        std::fs::create_dir_all(&dir).map_err(|e| GenerateError::io(&dir, e))?;

        let mut content = String::new();
        for entry in dir_entries {
            let subtitle = entry.subtitle_text().replace('"', "\"\"");
            for variant in 0..=variation_count {
                let stem = variant_stem(&entry.audio_filename, variant, variation_count);
                content.push_str(&format!("{stem}.wav,\"{subtitle}\"\n"));
            }
        }

        let mut file = std::fs::File::create(&path).map_err(|e| GenerateError::io(&path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| GenerateError::io(&path, e))?;
        written += 1;
    }
    Ok(written)
}

/// Radio check replies, a few of them naming the engineer.
pub fn radio_check_phrases(spoken_name: &str) -> Vec<String> {
    let mut phrases = vec![
        format!("Engineer {spoken_name} confirming radio"),
        format!("{spoken_name} here, ready to help"),
        format!("{spoken_name} reading you, radio check"),
    ];
    phrases.extend(
        [
            "Radio's loud and clear",
            "Copy that, radio check",
            "Loud and clear",
            "Radio check",
            "You're coming in clear",
            "Radio's good",
            "Clear signal, all good",
            "Check, check, radio's fine",
            "Radio's up, you're clear",
            "Loud and clear, over",
            "Radio check, all systems go",
            "You're clear on my end",
            "Radio's strong",
            "All good, radio's clear",
            "Copy, loud and clear",
            "Check",
            "Signal's clear, radio check",
            "You're loud and clear",
        ]
        .map(String::from),
    );
    phrases
}

/// Where radio check clips are written, below the voice directory.
pub fn radio_check_dir(config: &GenerationConfig) -> PathBuf {
    config
        .voice_dir()
        .join(format!("radio_check_{}", config.voice_name))
}

/// Work items for the radio check clips.
///
/// CrewChief looks for these in a `test` folder outside the voice pack, so
/// they are written to `radio_check_{voice}/test` for the user to move.
pub fn radio_check_items(config: &GenerationConfig, references: &Arc<[PathBuf]>) -> Vec<WorkItem> {
    let dir = radio_check_dir(config).join("test");
    radio_check_phrases(config.spoken_voice_name())
        .into_iter()
        .enumerate()
        .map(|(idx, text)| {
            WorkItem::new(dir.clone(), (idx + 1).to_string(), text, Arc::clone(references))
        })
        .collect()
}
