//! Single-line progress display on a terminal.

use crate::domain::engine::{RunOutcome, RunSummary};
use crate::domain::progress::{ProgressReporter, ProgressUpdate};
use crate::domain::resolution::Resolution;
use std::io::{self, Stderr, Write};

/// Redraws one status line per product, e.g.
/// `Processing BTC-USD 1m : Record count 1440 [2/12 16.7%]`.
pub struct TerminalProgress<W: Write = Stderr> {
    out: W,
}

impl TerminalProgress<Stderr> {
    pub fn stderr() -> Self {
        Self { out: io::stderr() }
    }
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, update: &ProgressUpdate) {
        // Display only; a broken terminal must not abort the run.
        let _ = write!(
            self.out,
            "\rProcessing {} {} : Record count {} [{}/{} {:.1}%]",
            update.product,
            update.resolution,
            update.records_written,
            update.windows_done,
            update.windows_total,
            update.fraction() * 100.0
        );
        let _ = self.out.flush();
    }
}

impl<W: Write> ProgressReporter for TerminalProgress<W> {
    fn on_start(&mut self, product: &str, resolution: Resolution, windows_total: usize) {
        self.draw(&ProgressUpdate {
            product: product.to_string(),
            resolution,
            windows_done: 0,
            windows_total,
            records_written: 0,
        });
    }

    fn update(&mut self, progress: &ProgressUpdate) {
        self.draw(progress);
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        let status = match &summary.outcome {
            RunOutcome::Completed => "done",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed { .. } => "failed",
        };
        let _ = writeln!(self.out, " {status}");
        let _ = self.out.flush();
    }
}
