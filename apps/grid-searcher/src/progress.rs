//! Progress tracking and the terminal progress bar.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::store::ResultStore;

/// Symbol for the filled part of the bar.
const BAR_FILL: char = '-';

/// Symbol marking the bar's leading edge.
const BAR_HEAD: char = '>';

/// Destination of progress bar frames.
#[derive(Default)]
pub enum ProgressSink {
    /// Standard output.
    #[default]
    Stdout,
    /// Any writer, e.g. an in-memory buffer.
    Writer(Box<dyn Write + Send>),
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl Write for ProgressSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout => io::stdout().write(buf),
            Self::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout => io::stdout().flush(),
            Self::Writer(w) => w.flush(),
        }
    }
}

/// Progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Total number of combinations.
    pub total: u64,
    /// Combinations that finished, including isolated failures.
    pub completed: u64,
    /// Isolated failures.
    pub failed: u64,
    /// Elapsed time in seconds.
    pub elapsed_secs: u64,
    /// Estimated time remaining in seconds.
    pub eta_secs: u64,
    /// Combinations finished per second.
    pub per_sec: f64,
}

impl Progress {
    /// Take a snapshot of `store` against `total`.
    #[must_use]
    pub fn snapshot<R>(store: &ResultStore<R>, total: usize, started: Instant) -> Self {
        let completed = store.settled() as u64;
        let failed = completed.saturating_sub(store.len() as u64);
        let elapsed = started.elapsed();

        let per_sec = if elapsed.as_secs_f64() > 0.0 {
            completed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let remaining = (total as u64).saturating_sub(completed);
        let eta_secs = if per_sec > 0.0 {
            (remaining as f64 / per_sec) as u64
        } else {
            0
        };

        Self {
            total: total as u64,
            completed,
            failed,
            elapsed_secs: elapsed.as_secs(),
            eta_secs,
            per_sec,
        }
    }

    /// Get completion percentage.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Number of filled columns for `completed` out of `total`.
#[must_use]
pub fn filled_width(completed: usize, total: usize, width: usize) -> usize {
    if total == 0 {
        return width;
    }
    (width * completed.min(total)) / total
}

/// Render an in-progress frame: `|--->   |`, `width` columns between the bars.
#[must_use]
pub fn render_frame(filled: usize, width: usize) -> String {
    let filled = filled.min(width.saturating_sub(1));
    let padding = width - filled - 1;
    let mut frame = String::with_capacity(width + 2);
    frame.push('|');
    frame.extend(std::iter::repeat_n(BAR_FILL, filled));
    frame.push(BAR_HEAD);
    frame.extend(std::iter::repeat_n(' ', padding));
    frame.push('|');
    frame
}

/// Render the final, fully filled frame.
#[must_use]
pub fn render_complete(width: usize) -> String {
    let mut frame = String::with_capacity(width + 2);
    frame.push('|');
    frame.extend(std::iter::repeat_n(BAR_FILL, width));
    frame.push('|');
    frame
}

/// Observer that renders the store's growth on a single terminal line.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    total: usize,
    width: usize,
    interval: Duration,
    enabled: bool,
}

impl ProgressMonitor {
    /// Create a monitor for `total` combinations.
    #[must_use]
    pub const fn new(total: usize, config: &SearchConfig) -> Self {
        Self {
            total,
            width: config.bar_width,
            interval: config.refresh_interval,
            enabled: config.verbose,
        }
    }

    /// Whether the monitor renders anything.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Poll `store` until every combination settled or `aborted` is raised.
    ///
    /// Returns immediately when disabled. Frames are redrawn only when the
    /// filled width changes; the full bar is drawn exactly once, on success.
    pub fn watch<R, W: Write>(&self, store: &ResultStore<R>, aborted: &AtomicBool, sink: &mut W) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.render_until_settled(store, aborted, sink) {
            warn!(error = %e, "Progress output failed, rendering stopped");
        }
    }

    fn render_until_settled<R, W: Write>(
        &self,
        store: &ResultStore<R>,
        aborted: &AtomicBool,
        sink: &mut W,
    ) -> io::Result<()> {
        let started = Instant::now();
        let mut last_filled = None;

        loop {
            let settled = store.settled();
            if settled >= self.total {
                writeln!(sink, "\r{}", render_complete(self.width))?;
                return sink.flush();
            }
            if aborted.load(Ordering::Acquire) {
                writeln!(sink)?;
                return sink.flush();
            }

            let filled = filled_width(settled, self.total, self.width);
            if last_filled != Some(filled) {
                write!(sink, "\r{}", render_frame(filled, self.width))?;
                sink.flush()?;
                last_filled = Some(filled);
            }

            let progress = Progress::snapshot(store, self.total, started);
            debug!(
                "Progress: {:.1}% ({}/{}) - ETA: {}s",
                progress.percentage(),
                progress.completed,
                progress.total,
                progress.eta_secs
            );

            thread::sleep(self.interval);
        }
    }
}
