//! The phrase inventory: loading, text filtering and ordering.
//!
//! The inventory is a CSV file with a header row and one phrase per line:
//!
//! ```text
//! audio_path,audio_filename,subtitle,text_for_tts
//! \voice\spotter,clear_left.wav,"Clear left","clear left"
//! ```
//!
//! Paths use Windows separators as in the original CrewChief pack and are
//! converted to `/` on load.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use regex::{NoExpand, Regex};

use crate::item::PhraseEntry;

/// Stands in for the listener's own name in paths, subtitles and text.
pub const NAME_PLACEHOLDER: &str = "YOUR_NAME";

#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    #[error("Cannot open inventory {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Inventory row {row} has {fields} fields, expected at least 4")]
    MalformedRow { row: usize, fields: usize },
    #[error("Invalid replacement pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Read every phrase from the inventory at `path`.
///
/// Only the first four columns are used; anything after them is ignored.
pub fn load_inventory(path: &Path) -> Result<Vec<PhraseEntry>, InventoryError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| InventoryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let entries = read_entries(reader)?;
    log::info!("Loaded {} phrases from {}", entries.len(), path.display());
    Ok(entries)
}

fn read_entries<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<PhraseEntry>, InventoryError> {
    let mut entries = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 4 {
            return Err(InventoryError::MalformedRow {
                // 1-based, after the header
                row: idx + 2,
                fields: record.len(),
            });
        }
        let audio_path = record[0].replace('\\', "/");
        let audio_filename = record[1].strip_suffix(".wav").unwrap_or(&record[1]);
        entries.push(PhraseEntry::new(
            audio_path,
            audio_filename,
            &record[2],
            &record[3],
        ));
    }
    Ok(entries)
}

/// A text substitution applied before synthesis.
#[derive(Debug, Clone)]
pub struct ReplacementRule {
    pub pattern: Regex,
    pub replacement: String,
    /// Chance of applying the rule when the pattern matches, in `[0, 1]`.
    pub probability: f64,
}

impl ReplacementRule {
    pub fn new(
        pattern: &str,
        replacement: impl Into<String>,
        probability: f64,
    ) -> Result<Self, InventoryError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
            probability,
        })
    }
}

/// The stock rules: the listener's name or "buddy" in place of "mate",
/// milder language, and spelled-out corner names.
pub fn default_replacement_rules(your_name: &str) -> Result<Vec<ReplacementRule>, InventoryError> {
    Ok(vec![
        ReplacementRule::new(r"\bmate\b", your_name, 0.8)?,
        ReplacementRule::new(r"\bmate\b", "buddy", 0.2)?,
        ReplacementRule::new(r"\bmate\b", "", 1.0)?,
        ReplacementRule::new(r"\bbloody\b", "damn", 1.0)?,
        ReplacementRule::new(r"130R", "one-thirty R", 1.0)?,
    ])
}

/// Apply each matching rule to every occurrence, subject to its probability.
pub fn apply_replacements(text: &str, rules: &[ReplacementRule], rng: &mut impl Rng) -> String {
    let mut text = text.to_string();
    for rule in rules {
        if rule.pattern.is_match(&text) && rng.gen::<f64>() < rule.probability {
            let replaced = rule
                .pattern
                .replace_all(&text, NoExpand(&rule.replacement))
                .into_owned();
            log::debug!("Replaced {:?}: {text:?} -> {replaced:?}", rule.pattern.as_str());
            text = replaced;
        }
    }
    text
}

/// Produce the filtered form of an entry: replacement rules on the text, then
/// the name placeholder everywhere.
pub fn filter_entry(
    entry: PhraseEntry,
    your_name: &str,
    rules: &[ReplacementRule],
    rng: &mut impl Rng,
) -> PhraseEntry {
    let text =
        apply_replacements(&entry.text_for_tts, rules, rng).replace(NAME_PLACEHOLDER, your_name);
    let path = entry.audio_path.replace(NAME_PLACEHOLDER, your_name);
    let subtitle = entry.subtitle.replace(NAME_PLACEHOLDER, your_name);
    entry.with_filtered(path, subtitle, text)
}

/// Randomise processing order so parallel processes rarely collide.
pub fn shuffle(entries: &mut [PhraseEntry], rng: &mut impl Rng) {
    entries.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parse(csv_text: &str) -> Result<Vec<PhraseEntry>, InventoryError> {
        read_entries(
            csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_reader(csv_text.as_bytes()),
        )
    }

    #[test]
    fn parses_rows_and_normalises_paths() {
        let entries = parse(
            "audio_path,audio_filename,subtitle,text_for_tts\n\
             \\voice\\spotter,clear_left.wav,\"Clear left\",\"clear, left\"\n\
             \\voice\\fuel,box.wav,Box,box box,extra\n",
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].audio_path, "/voice/spotter");
        assert_eq!(entries[0].audio_filename, "clear_left");
        assert_eq!(entries[0].text_for_tts, "clear, left");
        assert_eq!(entries[1].subtitle, "Box");
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = parse("a,b,c,d\n\\voice,x.wav,X\n").unwrap_err();
        assert!(matches!(err, InventoryError::MalformedRow { row: 2, fields: 3 }));
    }

    #[test]
    fn certain_rules_always_apply() {
        let rules = vec![ReplacementRule::new(r"\bbloody\b", "damn", 1.0).unwrap()];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            apply_replacements("that was bloody close, bloody hell", &rules, &mut rng),
            "that was damn close, damn hell"
        );
        // word boundaries hold
        assert_eq!(apply_replacements("bloodywell", &rules, &mut rng), "bloodywell");
    }

    #[test]
    fn zero_probability_rules_never_apply() {
        let rules = vec![ReplacementRule::new(r"\bmate\b", "buddy", 0.0).unwrap()];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(apply_replacements("good job mate", &rules, &mut rng), "good job mate");
        }
    }

    #[test]
    fn replacement_text_is_literal() {
        let rules = vec![ReplacementRule::new(r"\bmate\b", "$1 cash", 1.0).unwrap()];
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(apply_replacements("nice one mate", &rules, &mut rng), "nice one $1 cash");
    }

    #[test]
    fn stock_rules_soften_the_text() {
        let rules = default_replacement_rules("Sam").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let text = apply_replacements("push now mate, 130R is flat", &rules, &mut rng);
            assert!(!text.contains("mate"), "{text}");
            assert!(text.contains("one-thirty R"), "{text}");
        }
        assert_eq!(
            apply_replacements("bloody hell, that was close", &rules, &mut rng),
            "damn hell, that was close"
        );
        // only whole words
        assert_eq!(apply_replacements("loody", &rules, &mut rng), "loody");
    }

    #[test]
    fn placeholder_is_substituted_everywhere() {
        let entry = PhraseEntry::new(
            "/voice/YOUR_NAME",
            "name",
            "Nice one YOUR_NAME",
            "nice one YOUR_NAME",
        );
        let mut rng = StdRng::seed_from_u64(0);
        let filtered = filter_entry(entry, "Sam", &[], &mut rng);
        assert_eq!(filtered.path(), "/voice/Sam");
        assert_eq!(filtered.subtitle_text(), "Nice one Sam");
        assert_eq!(filtered.tts_text(), "nice one Sam");
    }

    #[test]
    fn shuffle_keeps_every_entry() {
        let mut entries: Vec<PhraseEntry> = (0..20)
            .map(|i| PhraseEntry::new("/voice", format!("p{i}"), "s", "t"))
            .collect();
        let mut rng = StdRng::seed_from_u64(42);
        shuffle(&mut entries, &mut rng);

        let mut names: Vec<_> = entries.iter().map(|e| e.audio_filename.clone()).collect();
        names.sort();
        let mut expected: Vec<_> = (0..20).map(|i| format!("p{i}")).collect();
        expected.sort();
        assert_eq!(names, expected);
    }
}
