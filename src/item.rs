//! Phrases and the per-variant units of work derived from them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix of the raw synthesis output, before effects.
pub const RAW_SUFFIX: &str = ".raw.wav";
/// Suffix of an attempt's finished clip before it is validated and published.
pub const STAGING_SUFFIX: &str = ".part.wav";
/// Marker placed in the name of a kept, rejected take.
pub const INVALID_MARKER: &str = ".invalid-";

/// One row of the phrase inventory.
///
/// Placeholder substitution happens once, upstream of generation; when a
/// filtered form is present it is the authoritative one.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseEntry {
    /// Directory relative to the voice root, with forward slashes.
    pub audio_path: String,
    /// Base filename, without extension.
    pub audio_filename: String,
    pub subtitle: String,
    pub text_for_tts: String,
    filtered: Option<FilteredPhrase>,
}

#[derive(Debug, Clone, PartialEq)]
struct FilteredPhrase {
    audio_path: String,
    subtitle: String,
    text_for_tts: String,
}

impl PhraseEntry {
    pub fn new(
        audio_path: impl Into<String>,
        audio_filename: impl Into<String>,
        subtitle: impl Into<String>,
        text_for_tts: impl Into<String>,
    ) -> Self {
        Self {
            audio_path: audio_path.into(),
            audio_filename: audio_filename.into(),
            subtitle: subtitle.into(),
            text_for_tts: text_for_tts.into(),
            filtered: None,
        }
    }

    /// Attach the substituted path, subtitle and text.
    pub fn with_filtered(
        mut self,
        audio_path: String,
        subtitle: String,
        text_for_tts: String,
    ) -> Self {
        self.filtered = Some(FilteredPhrase {
            audio_path,
            subtitle,
            text_for_tts,
        });
        self
    }

    /// Relative output directory, filtered when available.
    pub fn path(&self) -> &str {
        self.filtered
            .as_ref()
            .map_or(&self.audio_path, |f| &f.audio_path)
    }

    /// Subtitle, filtered when available.
    pub fn subtitle_text(&self) -> &str {
        self.filtered
            .as_ref()
            .map_or(&self.subtitle, |f| &f.subtitle)
    }

    /// Text handed to the synthesis backend, filtered when available.
    pub fn tts_text(&self) -> &str {
        self.filtered
            .as_ref()
            .map_or(&self.text_for_tts, |f| &f.text_for_tts)
    }

    /// The work items for every variant of this phrase.
    pub fn work_items(
        &self,
        voice_dir: &Path,
        variation_count: u32,
        reference_samples: &Arc<[PathBuf]>,
    ) -> Vec<WorkItem> {
        let output_dir = join_relative(voice_dir, self.path());
        (0..=variation_count)
            .map(|variant| {
                WorkItem::new(
                    output_dir.clone(),
                    variant_stem(&self.audio_filename, variant, variation_count),
                    self.tts_text(),
                    Arc::clone(reference_samples),
                )
            })
            .collect()
    }
}

/// Letter used for a variant: `0 → 'a'`, `1 → 'b'`, and so on.
pub fn variant_letter(variant_index: u32) -> char {
    debug_assert!(variant_index < 26, "variant index {variant_index} has no letter");
    char::from(b'a' + variant_index as u8)
}

/// Filename stem of one variant. Unsuffixed when variations are disabled.
pub fn variant_stem(base: &str, variant_index: u32, variation_count: u32) -> String {
    if variation_count == 0 {
        base.to_string()
    } else {
        format!("{base}-{}", variant_letter(variant_index))
    }
}

/// Join an inventory path such as `/voice/spotter` below `root`.
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    let trimmed = relative.trim_matches('/');
    if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    }
}

/// A single (phrase, variant) unit of work.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub output_dir: PathBuf,
    /// Canonical filename without the `.wav` extension.
    pub file_stem: String,
    pub text: String,
    pub reference_samples: Arc<[PathBuf]>,
}

impl WorkItem {
    pub fn new(
        output_dir: PathBuf,
        file_stem: String,
        text: impl Into<String>,
        reference_samples: Arc<[PathBuf]>,
    ) -> Self {
        Self {
            output_dir,
            file_stem,
            text: text.into(),
            reference_samples,
        }
    }

    /// Filename of the accepted clip, e.g. `push_now-a.wav`.
    pub fn filename(&self) -> String {
        format!("{}.wav", self.file_stem)
    }

    /// Where the accepted clip lives.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.filename())
    }

    pub fn raw_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}{RAW_SUFFIX}", self.file_stem))
    }

    pub fn staging_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}{STAGING_SUFFIX}", self.file_stem))
    }

    /// Name a rejected take of `attempt` is kept under.
    pub fn invalid_path(&self, attempt: u32) -> PathBuf {
        self.output_dir
            .join(format!("{}{INVALID_MARKER}{attempt}.wav", self.file_stem))
    }

    /// True if the clip, or an in-progress artifact of it, is on disk.
    pub fn exists_on_disk(&self) -> bool {
        self.output_path().is_file() || self.raw_path().is_file() || self.staging_path().is_file()
    }
}

/// True for files that are accepted clips, not intermediate or rejected takes.
pub fn is_finished_clip(file_name: &str) -> bool {
    file_name.ends_with(".wav")
        && !file_name.ends_with(RAW_SUFFIX)
        && !file_name.ends_with(STAGING_SUFFIX)
        && !file_name.contains(INVALID_MARKER)
}
