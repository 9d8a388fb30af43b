//! Progress observation for retrieval runs.

use crate::domain::engine::RunSummary;
use crate::domain::resolution::Resolution;

/// Cumulative progress of one product's run, sent after every committed
/// window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub product: String,
    pub resolution: Resolution,
    pub windows_done: usize,
    pub windows_total: usize,
    pub records_written: usize,
}

impl ProgressUpdate {
    pub fn fraction(&self) -> f64 {
        if self.windows_total == 0 {
            1.0
        } else {
            self.windows_done as f64 / self.windows_total as f64
        }
    }
}

/// Counters owned by the engine for the duration of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub windows_done: usize,
    pub windows_total: usize,
    pub records_written: usize,
}

impl ProgressState {
    pub fn new(windows_total: usize) -> Self {
        Self {
            windows_total,
            ..Self::default()
        }
    }

    pub fn commit_window(&mut self, new_records: usize) {
        self.windows_done += 1;
        self.records_written += new_records;
    }

    pub fn snapshot(&self, product: &str, resolution: Resolution) -> ProgressUpdate {
        ProgressUpdate {
            product: product.to_string(),
            resolution,
            windows_done: self.windows_done,
            windows_total: self.windows_total,
            records_written: self.records_written,
        }
    }
}

/// Observer notified by the retrieval engine.
pub trait ProgressReporter {
    fn on_start(&mut self, _product: &str, _resolution: Resolution, _windows_total: usize) {}

    fn update(&mut self, progress: &ProgressUpdate);

    fn on_finish(&mut self, _summary: &RunSummary) {}
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&mut self, _progress: &ProgressUpdate) {}
}
