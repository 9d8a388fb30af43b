//! Retrieval engine: drives one product's windows from fetch to storage.
//!
//! Windows are processed strictly in chronological order. For each window
//! the engine acquires a rate-limit slot, fetches (retrying transient
//! failures a bounded number of times), drops candles that are already
//! stored, and persists the rest as one atomic batch before moving on. A
//! fatal error stops the run and records the last committed boundary so a
//! rerun can resume from it.

use crate::domain::cancel::CancelToken;
use crate::domain::candle::{CandleRecord, Namespace};
use crate::domain::dedup;
use crate::domain::error::{Cancelled, CandleError};
use crate::domain::progress::{ProgressReporter, ProgressState};
use crate::domain::rate_limit::RateLimiter;
use crate::domain::resolution::Resolution;
use crate::domain::time_window::{plan, TimeRange, Window};
use crate::ports::candle_port::CandleSource;
use crate::ports::store_port::CandleStore;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

pub const DEFAULT_COLLECTION_SUFFIX: &str = "historical-candlestick-data";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub collection_suffix: String,
    /// Fetch attempts per window, counting the first one.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_suffix: DEFAULT_COLLECTION_SUFFIX.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    /// `window` is `None` when the run failed before its first window.
    Failed {
        window: Option<Window>,
        error: CandleError,
    },
    Cancelled,
}

#[derive(Debug)]
pub struct RunSummary {
    pub product: String,
    pub resolution: Resolution,
    pub range: TimeRange,
    pub outcome: RunOutcome,
    pub windows_done: usize,
    pub windows_total: usize,
    pub records_written: usize,
    /// End of the last committed window (or the range start). Restarting
    /// from here skips no data and repeats no committed window.
    pub resume_from: DateTime<Utc>,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, RunOutcome::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }
}

enum WindowError {
    Cancelled,
    Fatal(CandleError),
}

impl From<Cancelled> for WindowError {
    fn from(_: Cancelled) -> Self {
        WindowError::Cancelled
    }
}

impl From<CandleError> for WindowError {
    fn from(err: CandleError) -> Self {
        WindowError::Fatal(err)
    }
}

pub struct RetrievalEngine<'a> {
    source: &'a dyn CandleSource,
    store: &'a dyn CandleStore,
    limiter: &'a RateLimiter,
    cancel: CancelToken,
    config: EngineConfig,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(
        source: &'a dyn CandleSource,
        store: &'a dyn CandleStore,
        limiter: &'a RateLimiter,
        cancel: CancelToken,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            store,
            limiter,
            cancel,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn namespace(&self, product: &str, resolution: Resolution) -> Namespace {
        Namespace::new(product, resolution, &self.config.collection_suffix)
    }

    /// Retrieve and persist every new candle of `product` within `range`.
    pub fn run(
        &self,
        product: &str,
        range: TimeRange,
        resolution: Resolution,
        progress: &mut dyn ProgressReporter,
    ) -> RunSummary {
        let namespace = self.namespace(product, resolution);
        let windows = plan(range, resolution);
        let mut state = ProgressState::new(windows.len());
        let mut resume_from = range.start();

        info!(
            product,
            resolution = %resolution,
            range = %range,
            windows = state.windows_total,
            collection = %namespace,
            "starting retrieval"
        );
        progress.on_start(product, resolution, state.windows_total);

        let outcome = match self.store.ensure_namespace(&namespace) {
            Err(error) => RunOutcome::Failed {
                window: None,
                error,
            },
            Ok(()) => {
                let mut outcome = RunOutcome::Completed;
                for window in windows {
                    match self.process_window(&namespace, &window) {
                        Ok(written) => {
                            state.commit_window(written);
                            resume_from = window.end();
                            progress.update(&state.snapshot(product, resolution));
                        }
                        Err(WindowError::Cancelled) => {
                            info!(product, window = %window, "retrieval cancelled");
                            outcome = RunOutcome::Cancelled;
                            break;
                        }
                        Err(WindowError::Fatal(error)) => {
                            warn!(product, window = %window, %error, "retrieval failed");
                            outcome = RunOutcome::Failed {
                                window: Some(window),
                                error,
                            };
                            break;
                        }
                    }
                }
                outcome
            }
        };

        let summary = RunSummary {
            product: product.to_string(),
            resolution,
            range,
            outcome,
            windows_done: state.windows_done,
            windows_total: state.windows_total,
            records_written: state.records_written,
            resume_from,
        };

        info!(
            product,
            windows_done = summary.windows_done,
            windows_total = summary.windows_total,
            records_written = summary.records_written,
            "retrieval finished"
        );
        progress.on_finish(&summary);
        summary
    }

    fn process_window(&self, namespace: &Namespace, window: &Window) -> Result<usize, WindowError> {
        self.cancel.check()?;

        let candidates = self.fetch_with_retry(namespace, window)?;
        let fetched = candidates.len();
        let fresh = dedup::filter(self.store, namespace, candidates)?;

        let written = if fresh.is_empty() {
            0
        } else {
            self.store.insert_batch(namespace, &fresh)?
        };

        debug!(
            window = %window,
            fetched,
            fresh = fresh.len(),
            written,
            "window committed"
        );
        Ok(written)
    }

    fn fetch_with_retry(
        &self,
        namespace: &Namespace,
        window: &Window,
    ) -> Result<Vec<CandleRecord>, WindowError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire(&self.cancel)?;

            match self
                .source
                .fetch(namespace.product(), window, namespace.resolution())
            {
                Ok(records) => return Ok(records),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    warn!(
                        product = namespace.product(),
                        window = %window,
                        attempt,
                        max_attempts,
                        %error,
                        "transient fetch failure, retrying"
                    );
                }
                Err(error) => return Err(WindowError::Fatal(error.into())),
            }
        }
    }
}
