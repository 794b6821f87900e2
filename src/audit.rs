//! Post-run check for clips that are suspiciously large for their directory.
//!
//! Clips in one directory are usually variants of the same phrase, so a take
//! far above the local average tends to be one that rambled or trailed off
//! into noise without tripping the validator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// The oversized clips of one directory.
#[derive(Debug, Clone, PartialEq)]
pub struct OversizedGroup {
    pub dir: PathBuf,
    pub average_size: f64,
    pub files: Vec<PathBuf>,
}

/// List `.wav` files larger than their directory's average by more than
/// `percentage` percent. Directories without any such file are omitted.
pub fn find_oversized(
    root: &Path,
    percentage: f64,
) -> Result<Vec<OversizedGroup>, walkdir::Error> {
    let mut by_dir: BTreeMap<PathBuf, Vec<(PathBuf, u64)>> = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        let is_wav = entry.path().extension().is_some_and(|ext| ext == "wav");
        if !entry.file_type().is_file() || !is_wav {
            continue;
        }
        let size = entry.metadata()?.len();
        let dir = entry.path().parent().unwrap_or(root).to_path_buf();
        by_dir
            .entry(dir)
            .or_default()
            .push((entry.into_path(), size));
    }

    let factor = 1.0 + percentage / 100.0;
    let groups = by_dir
        .into_iter()
        .filter_map(|(dir, mut files)| {
            let total: f64 = files.iter().map(|(_, size)| *size as f64).sum();
            let average_size = total / files.len() as f64;
            let threshold = average_size * factor;
            files.retain(|(_, size)| *size as f64 > threshold);
            if files.is_empty() {
                return None;
            }
            let mut files: Vec<PathBuf> = files.into_iter().map(|(path, _)| path).collect();
            files.sort();
            Some(OversizedGroup {
                dir,
                average_size,
                files,
            })
        })
        .collect();
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sized(path: &Path, len: usize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn flags_files_above_the_local_average() {
        let dir = tempfile::tempdir().unwrap();
        let spotter = dir.path().join("voice/spotter");
        write_sized(&spotter.join("a.wav"), 100);
        write_sized(&spotter.join("b.wav"), 100);
        write_sized(&spotter.join("c.wav"), 400);
        // average 200, threshold at 50% is 300
        let groups = find_oversized(dir.path(), 50.0).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].dir, spotter);
        assert_eq!(groups[0].average_size, 200.0);
        assert_eq!(groups[0].files, vec![spotter.join("c.wav")]);
    }

    #[test]
    fn directories_are_judged_separately() {
        let dir = tempfile::tempdir().unwrap();
        // large but uniform
        write_sized(&dir.path().join("long/a.wav"), 5_000);
        write_sized(&dir.path().join("long/b.wav"), 5_000);
        write_sized(&dir.path().join("short/a.wav"), 10);
        write_sized(&dir.path().join("short/b.wav"), 10);

        assert!(find_oversized(dir.path(), 10.0).unwrap().is_empty());
    }

    #[test]
    fn non_wav_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_sized(&dir.path().join("a.wav"), 100);
        write_sized(&dir.path().join("b.wav"), 100);
        write_sized(&dir.path().join("subtitles.csv"), 10_000);

        assert!(find_oversized(dir.path(), 0.0).unwrap().is_empty());
    }
}
