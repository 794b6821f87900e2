//! Throughput and ETA reporting for long batches.
//!
//! Progress is measured from the output tree rather than from the
//! orchestrator, so it also reflects clips written by other processes working
//! on the same voice. Counting walks the whole tree, which is why samples are
//! taken on a background thread at a fixed interval.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::item::is_finished_clip;

/// Segments in the progress bar.
pub const BAR_LENGTH: usize = 10;

/// Count accepted clips anywhere below `root`, leaving out the `excluded`
/// subtrees.
pub fn count_finished_clips(root: &Path, excluded: &[PathBuf]) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|dir| entry.path() == dir))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().is_some_and(is_finished_clip))
        .count()
}

/// A point-in-time progress measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub expected_total: usize,
    /// Clips present now.
    pub current: usize,
    /// Clips present when the batch started.
    pub initial: usize,
    /// Time since the batch started.
    pub elapsed: Duration,
    /// Clips present at the previous snapshot.
    pub previous: usize,
    /// Time since the previous snapshot.
    pub since_previous: Duration,
}

impl ProgressSnapshot {
    /// Clips per second since the previous snapshot, or the average since the
    /// batch started when nothing changed in between.
    pub fn rate(&self) -> f64 {
        let recent_secs = self.since_previous.as_secs_f64();
        let recent = if recent_secs > 0.0 {
            self.current.saturating_sub(self.previous) as f64 / recent_secs
        } else {
            0.0
        };
        if recent > 0.0 {
            return recent;
        }

        let total_secs = self.elapsed.as_secs_f64();
        if total_secs > 0.0 {
            self.current.saturating_sub(self.initial) as f64 / total_secs
        } else {
            0.0
        }
    }

    /// Time left at the current rate. `None` when nothing is moving.
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.rate();
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.expected_total.saturating_sub(self.current) as f64;
        Some(Duration::from_secs_f64(remaining / rate))
    }
}

/// Samples the output tree and remembers the previous sample.
#[derive(Debug)]
pub struct ProgressTracker {
    root: PathBuf,
    excluded: Vec<PathBuf>,
    expected_total: usize,
    started: Instant,
    initial: usize,
    previous: (Instant, usize),
}

impl ProgressTracker {
    /// Start tracking, counting what is already on disk as the baseline.
    ///
    /// Clips under `excluded` are not part of `expected_total` and are never
    /// counted.
    pub fn new(
        root: impl Into<PathBuf>,
        excluded: Vec<PathBuf>,
        expected_total: usize,
        started: Instant,
    ) -> Self {
        let root = root.into();
        let initial = count_finished_clips(&root, &excluded);
        Self {
            root,
            excluded,
            expected_total,
            started,
            initial,
            previous: (started, initial),
        }
    }

    pub fn sample(&mut self) -> ProgressSnapshot {
        let now = Instant::now();
        let current = count_finished_clips(&self.root, &self.excluded);
        let (previous_at, previous) = self.previous;
        self.previous = (now, current);
        ProgressSnapshot {
            expected_total: self.expected_total,
            current,
            initial: self.initial,
            elapsed: now.duration_since(self.started),
            previous,
            since_previous: now.duration_since(previous_at),
        }
    }
}

/// Render a snapshot, e.g.
/// `Progress: 29.8% [==>       ] 2721/9145 phrases, 4.9 phrases/sec, ETA 0h 26m`.
pub fn format_progress(snapshot: &ProgressSnapshot) -> String {
    let (current, total) = (snapshot.current, snapshot.expected_total);
    let percentage = if total > 0 {
        current as f64 / total as f64 * 100.0
    } else {
        100.0
    };

    let filled = if total > 0 {
        BAR_LENGTH * current / total
    } else {
        BAR_LENGTH
    };
    let bar = if filled >= BAR_LENGTH {
        "=".repeat(BAR_LENGTH)
    } else {
        format!("{}>{}", "=".repeat(filled), " ".repeat(BAR_LENGTH - filled - 1))
    };

    let eta = match snapshot.eta() {
        Some(eta) => {
            let secs = eta.as_secs();
            format!("ETA {}h {}m", secs / 3600, (secs % 3600) / 60)
        }
        None => "ETA Unknown".to_string(),
    };

    format!(
        "Progress: {percentage:4.1}% [{bar}] {current}/{total} phrases, {:.1} phrases/sec, {eta}",
        snapshot.rate()
    )
}

/// Logs a progress line at a fixed interval from a background thread.
///
/// Dropping the reporter stops the thread after one final line.
pub struct ProgressReporter {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn spawn(mut tracker: ProgressTracker, interval: Duration) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            log::info!("{}", format_progress(&tracker.sample()));
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("{}", format_progress(&tracker.sample()));
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Progress reporting disabled, could not start thread: {e}");
                None
            }
        };
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stop reporting and wait for the final line.
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Progress thread panicked");
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
