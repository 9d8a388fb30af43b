#![allow(dead_code)]

use candlescrape::domain::cancel::CancelToken;
use candlescrape::domain::candle::{CandleRecord, Namespace, Product};
use candlescrape::domain::engine::RunSummary;
use candlescrape::domain::error::{CandleError, Cancelled, FetchError};
use candlescrape::domain::progress::{ProgressReporter, ProgressUpdate};
use candlescrape::domain::rate_limit::{Clock, ManualClock};
use candlescrape::domain::resolution::Resolution;
use candlescrape::domain::time_window::{TimeRange, Window};
use candlescrape::ports::candle_port::{CandleSource, ProductSource};
use candlescrape::ports::store_port::CandleStore;
use chrono::{DateTime, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub const SUFFIX: &str = "historical-candlestick-data";

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeRange {
    TimeRange::new(start, end).unwrap()
}

pub fn make_candle(timestamp: i64, close: f64) -> CandleRecord {
    CandleRecord {
        timestamp,
        low: close - 2.0,
        high: close + 1.0,
        open: close - 1.0,
        close,
        volume: 100.0,
    }
}

/// One candle per granularity step of `window`.
pub fn candles_for_window(window: &Window, resolution: Resolution) -> Vec<CandleRecord> {
    let step = resolution.granularity_secs();
    (window.start().timestamp()..window.end().timestamp())
        .step_by(step as usize)
        .map(|ts| make_candle(ts, 100.0 + (ts % 1000) as f64))
        .collect()
}

/// `count` one-minute candles starting at `start`.
pub fn minute_candles(start: DateTime<Utc>, count: usize) -> Vec<CandleRecord> {
    (0..count as i64)
        .map(|i| make_candle(start.timestamp() + i * 60, 100.0 + i as f64))
        .collect()
}

/// Candle source answering from a script, then with a full window of
/// candles once the script runs out.
pub struct MockCandleSource {
    script: RefCell<VecDeque<Result<Vec<CandleRecord>, FetchError>>>,
    calls: RefCell<Vec<(String, Window)>>,
}

impl MockCandleSource {
    pub fn new() -> Self {
        Self {
            script: RefCell::new(VecDeque::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn then(self, response: Result<Vec<CandleRecord>, FetchError>) -> Self {
        self.script.borrow_mut().push_back(response);
        self
    }

    pub fn then_ok(self, candles: Vec<CandleRecord>) -> Self {
        self.then(Ok(candles))
    }

    pub fn then_err(self, error: FetchError) -> Self {
        self.then(Err(error))
    }

    pub fn calls(&self) -> Vec<(String, Window)> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CandleSource for MockCandleSource {
    fn fetch(
        &self,
        product: &str,
        window: &Window,
        resolution: Resolution,
    ) -> Result<Vec<CandleRecord>, FetchError> {
        self.calls.borrow_mut().push((product.to_string(), *window));
        match self.script.borrow_mut().pop_front() {
            Some(response) => response,
            None => Ok(candles_for_window(window, resolution)),
        }
    }
}

/// In-memory store that counts lookups and would-be duplicate writes.
pub struct MockStore {
    tables: RefCell<HashMap<String, BTreeMap<i64, CandleRecord>>>,
    pub lookups: Cell<usize>,
    pub insert_calls: Cell<usize>,
    pub duplicate_writes: Cell<usize>,
    fail_inserts: Cell<bool>,
    racing_writes: RefCell<Vec<(String, CandleRecord)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            tables: RefCell::new(HashMap::new()),
            lookups: Cell::new(0),
            insert_calls: Cell::new(0),
            duplicate_writes: Cell::new(0),
            fail_inserts: Cell::new(false),
            racing_writes: RefCell::new(Vec::new()),
        }
    }

    pub fn with_records(self, namespace: &Namespace, records: &[CandleRecord]) -> Self {
        {
            let mut tables = self.tables.borrow_mut();
            let table = tables.entry(namespace.collection_name()).or_default();
            for r in records {
                table.insert(r.timestamp, *r);
            }
        }
        self
    }

    /// Records another writer commits right after the next existence
    /// lookup, so the lookup misses them but the insert collides.
    pub fn with_racing_writer(self, namespace: &Namespace, records: &[CandleRecord]) -> Self {
        self.racing_writes.borrow_mut().extend(
            records
                .iter()
                .map(|r| (namespace.collection_name(), *r)),
        );
        self
    }

    pub fn failing_inserts(self) -> Self {
        self.fail_inserts.set(true);
        self
    }

    pub fn stored(&self, namespace: &Namespace) -> Vec<CandleRecord> {
        self.tables
            .borrow()
            .get(&namespace.collection_name())
            .map(|t| t.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, namespace: &Namespace) -> usize {
        self.stored(namespace).len()
    }

    pub fn has_namespace(&self, namespace: &Namespace) -> bool {
        self.tables
            .borrow()
            .contains_key(&namespace.collection_name())
    }
}

impl CandleStore for MockStore {
    fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), CandleError> {
        self.tables
            .borrow_mut()
            .entry(namespace.collection_name())
            .or_default();
        Ok(())
    }

    fn existing_timestamps(
        &self,
        namespace: &Namespace,
        timestamps: &[i64],
    ) -> Result<HashSet<i64>, CandleError> {
        self.lookups.set(self.lookups.get() + 1);
        let mut tables = self.tables.borrow_mut();
        let existing = match tables.get(&namespace.collection_name()) {
            Some(table) => timestamps
                .iter()
                .copied()
                .filter(|ts| table.contains_key(ts))
                .collect(),
            None => HashSet::new(),
        };
        for (name, r) in self.racing_writes.borrow_mut().drain(..) {
            tables.entry(name).or_default().insert(r.timestamp, r);
        }
        Ok(existing)
    }

    fn insert_batch(
        &self,
        namespace: &Namespace,
        records: &[CandleRecord],
    ) -> Result<usize, CandleError> {
        self.insert_calls.set(self.insert_calls.get() + 1);
        if self.fail_inserts.get() {
            return Err(CandleError::DatabaseQuery {
                reason: "disk full".into(),
            });
        }

        let mut tables = self.tables.borrow_mut();
        let table = tables
            .get_mut(&namespace.collection_name())
            .ok_or_else(|| CandleError::DatabaseQuery {
                reason: format!("no such table: {namespace}"),
            })?;
        let mut written = 0;
        for r in records {
            if table.contains_key(&r.timestamp) {
                self.duplicate_writes.set(self.duplicate_writes.get() + 1);
            } else {
                table.insert(r.timestamp, *r);
                written += 1;
            }
        }
        Ok(written)
    }

    fn namespace_stats(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<(i64, i64, usize)>, CandleError> {
        let tables = self.tables.borrow();
        Ok(tables.get(&namespace.collection_name()).and_then(|t| {
            let first = *t.keys().next()?;
            let last = *t.keys().next_back()?;
            Some((first, last, t.len()))
        }))
    }
}

pub struct MockProductSource {
    pub products: Vec<Product>,
    pub error: Option<FetchError>,
    pub calls: Cell<usize>,
}

impl MockProductSource {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            error: None,
            calls: Cell::new(0),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            products: Vec::new(),
            error: Some(error),
            calls: Cell::new(0),
        }
    }
}

impl ProductSource for MockProductSource {
    fn list_products(&self) -> Result<Vec<Product>, FetchError> {
        self.calls.set(self.calls.get() + 1);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.products.clone()),
        }
    }
}

/// Records every progress notification.
#[derive(Default)]
pub struct RecordingProgress {
    pub started: Vec<(String, Resolution, usize)>,
    pub updates: Vec<ProgressUpdate>,
    pub finished: Vec<String>,
}

impl RecordingProgress {
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.updates
            .iter()
            .map(|u| (u.windows_done, u.records_written))
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_start(&mut self, product: &str, resolution: Resolution, windows_total: usize) {
        self.started
            .push((product.to_string(), resolution, windows_total));
    }

    fn update(&mut self, progress: &ProgressUpdate) {
        self.updates.push(progress.clone());
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        self.finished.push(summary.product.clone());
    }
}

/// Manual clock that trips a cancel token the first time anything has to
/// wait, standing in for a Ctrl-C arriving during a rate-limit wait.
pub struct CancellingClock {
    inner: ManualClock,
    cancel: CancelToken,
    pub sleeps: AtomicUsize,
}

impl CancellingClock {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            inner: ManualClock::new(),
            cancel,
            sleeps: AtomicUsize::new(0),
        }
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for CancellingClock {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        self.inner.sleep(duration, cancel)
    }
}
