//! Best-so-far bookkeeping and the progress log.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::application::gap::GapResult;
use crate::error::Result;

/// Append-only `elapsedMillis, bestGap` lines.
#[derive(Debug)]
pub struct ProgressLog {
    writer: Mutex<BufWriter<File>>,
}

impl ProgressLog {
    /// Open `path` for appending, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be opened.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "Opened progress log");
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one line and flush it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the write fails.
    pub fn record(&self, elapsed: Duration, best_gap: f64) -> Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}, {}", elapsed.as_millis(), best_gap)?;
        writer.flush()?;
        Ok(())
    }
}

/// Monotone best result of a run.
#[derive(Debug)]
pub(crate) struct Incumbent {
    started: Instant,
    best: Option<GapResult>,
    log: Option<ProgressLog>,
    improvements: usize,
}

impl Incumbent {
    pub(crate) fn new(log: Option<ProgressLog>) -> Self {
        Self {
            started: Instant::now(),
            best: None,
            log,
            improvements: 0,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn best_gap(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.gap)
    }

    pub(crate) const fn improvements(&self) -> usize {
        self.improvements
    }

    /// Keep `result` if it beats the incumbent; returns whether it did.
    pub(crate) fn offer(&mut self, result: &GapResult) -> Result<bool> {
        if self.best_gap().is_some_and(|gap| result.gap <= gap) {
            return Ok(false);
        }
        self.best = Some(result.clone());
        self.improvements += 1;
        let elapsed = self.elapsed();
        info!(gap = result.gap, elapsed_ms = elapsed.as_millis() as u64, "New best gap");
        if let Some(log) = &self.log {
            log.record(elapsed, result.gap)?;
        }
        Ok(true)
    }

    pub(crate) fn into_best(self) -> Option<GapResult> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::demand::DemandMatrix;
    use crate::port::InnerSolution;

    fn result(gap: f64) -> GapResult {
        let inner = InnerSolution {
            objective: gap,
            demands: DemandMatrix::new(),
            flows: DemandMatrix::new(),
        };
        GapResult {
            gap,
            demands: DemandMatrix::new(),
            reference: inner.clone(),
            heuristic: inner,
        }
    }

    #[test]
    fn test_incumbent_is_monotone() {
        let mut incumbent = Incumbent::new(None);
        assert!(incumbent.offer(&result(2.0)).unwrap());
        assert!(!incumbent.offer(&result(1.0)).unwrap());
        assert!(!incumbent.offer(&result(2.0)).unwrap());
        assert!(incumbent.offer(&result(3.0)).unwrap());
        assert_eq!(incumbent.best_gap(), Some(3.0));
        assert_eq!(incumbent.improvements(), 2);
    }

    #[test]
    fn test_progress_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        {
            let mut incumbent = Incumbent::new(Some(ProgressLog::create(&path).unwrap()));
            incumbent.offer(&result(1.5)).unwrap();
            incumbent.offer(&result(4.0)).unwrap();
        }
        let log = ProgressLog::create(&path).unwrap();
        log.record(Duration::from_millis(7), 5.0).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(", 1.5"));
        assert_eq!(lines[2], "7, 5");
    }
}
