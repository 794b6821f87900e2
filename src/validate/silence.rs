use std::path::Path;
use std::process::{Command, Stdio};

use super::ValidationError;

/// Shortest flagged silence for short phrases, in seconds.
pub const SHORT_TEXT_SILENCE_SECS: f64 = 0.36;
/// Shortest flagged silence for longer phrases, in seconds.
pub const LONG_TEXT_SILENCE_SECS: f64 = 0.6;
/// Phrases with fewer characters than this count as short.
pub const SHORT_TEXT_CHARS: usize = 30;

/// Minimum silent run that rejects a clip spoken from `text`.
pub fn silence_threshold_for(text: &str) -> f64 {
    if text.chars().count() < SHORT_TEXT_CHARS {
        SHORT_TEXT_SILENCE_SECS
    } else {
        LONG_TEXT_SILENCE_SECS
    }
}

/// Finds runs of silence in an audio file.
pub trait SilenceDetector {
    /// Durations in seconds of every silent run at least `min_secs` long
    /// and quieter than `noise_db`.
    fn silent_runs(
        &self,
        path: &Path,
        noise_db: f64,
        min_secs: f64,
    ) -> Result<Vec<f64>, ValidationError>;
}

/// Silence detection through ffmpeg's `silencedetect` filter.
#[derive(Debug, Clone)]
pub struct FfmpegSilenceDetector {
    program: String,
}

impl Default for FfmpegSilenceDetector {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegSilenceDetector {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SilenceDetector for FfmpegSilenceDetector {
    fn silent_runs(
        &self,
        path: &Path,
        noise_db: f64,
        min_secs: f64,
    ) -> Result<Vec<f64>, ValidationError> {
        let filter = format!("silencedetect=n={noise_db}dB:d={min_secs}");
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .args(["-af", &filter, "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ValidationError::FfmpegNotFound
                } else {
                    ValidationError::Io(e)
                }
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            // a broken clip fails the header read in the duration check
            log::warn!(
                "ffmpeg could not scan {} for silence (exit {:?})",
                path.display(),
                output.status.code()
            );
            return Ok(Vec::new());
        }

        Ok(parse_silence_durations(&stderr))
    }
}

/// Pull every `silence_duration: X` value out of ffmpeg's log output.
pub fn parse_silence_durations(log: &str) -> Vec<f64> {
    log.lines()
        .filter_map(|line| line.split("silence_duration:").nth(1))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(|value| value.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary_is_thirty_characters() {
        let short = "a".repeat(29);
        let long = "a".repeat(30);
        assert_eq!(silence_threshold_for(&short), 0.36);
        assert_eq!(silence_threshold_for(&long), 0.6);
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        // 20 characters, 40 bytes
        let text = "é".repeat(20);
        assert_eq!(silence_threshold_for(&text), SHORT_TEXT_SILENCE_SECS);
    }

    #[test]
    fn parses_silencedetect_output() {
        let log = "\
Input #0, wav, from 'go.wav':
[silencedetect @ 0x55d5c0a2c0] silence_start: 0.512
[silencedetect @ 0x55d5c0a2c0] silence_end: 1.236 | silence_duration: 0.724
[silencedetect @ 0x55d5c0a2c0] silence_start: 2.1
[silencedetect @ 0x55d5c0a2c0] silence_end: 2.5 | silence_duration: 0.4
size=N/A time=00:00:02.80 bitrate=N/A speed= 512x";
        assert_eq!(parse_silence_durations(log), vec![0.724, 0.4]);
    }

    #[test]
    fn no_silence_lines_means_no_runs() {
        assert!(parse_silence_durations("size=N/A time=00:00:01.00").is_empty());
    }

    #[test]
    fn missing_ffmpeg_binary_is_reported() {
        let detector = FfmpegSilenceDetector::with_program("ffmpeg-binary-that-does-not-exist");
        let err = detector
            .silent_runs(Path::new("missing.wav"), -50.0, 0.36)
            .expect_err("missing binary must fail");
        assert!(matches!(err, ValidationError::FfmpegNotFound));
    }

    #[test]
    fn ffmpeg_finds_a_long_gap_when_installed() {
        // Skip when ffmpeg is unavailable in the execution environment.
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gap.wav");
        let tone = |n: usize| {
            (0..n).map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 24_000.0).sin() * 0.5)
        };
        let samples: Vec<f32> = tone(12_000)
            .chain(std::iter::repeat(0.0).take(24_000))
            .chain(tone(12_000))
            .collect();
        crate::SynthesisResult {
            samples,
            sample_rate: 24_000,
        }
        .write_wav(&path)
        .expect("write wav");

        let runs = FfmpegSilenceDetector::default()
            .silent_runs(&path, -50.0, 0.6)
            .expect("ffmpeg should succeed");
        assert_eq!(runs.len(), 1);
        assert!((runs[0] - 1.0).abs() < 0.05, "unexpected run {runs:?}");
    }
}
