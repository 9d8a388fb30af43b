//! Time ranges and the window planner.
//!
//! A requested range is split into consecutive windows no wider than the
//! resolution's upstream request span. Windows are half-open `[start, end)`,
//! contiguous, and the last one is clipped to the range end.

use crate::domain::error::CandleError;
use crate::domain::resolution::Resolution;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;

/// Half-open interval `[start, end)` with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// A range sized for one upstream request.
pub type Window = TimeRange;

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CandleError> {
        if start > end {
            return Err(CandleError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The range of `lookback` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, lookback: TimeDelta) -> Self {
        Self {
            start: end - lookback,
            end,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// Lazily yields the windows covering a range.
///
/// Holds no state beyond its cursor; `plan` with the same inputs always
/// yields the same sequence.
#[derive(Debug, Clone)]
pub struct Windows {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    span: TimeDelta,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let end = start
            .checked_add_signed(self.span)
            .map_or(self.end, |t| t.min(self.end));
        self.cursor = end;
        Some(TimeRange { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = remaining(self.cursor, self.end, self.span);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Windows {}

impl std::iter::FusedIterator for Windows {}

fn remaining(cursor: DateTime<Utc>, end: DateTime<Utc>, span: TimeDelta) -> usize {
    if cursor >= end {
        return 0;
    }
    let total = (end - cursor).num_milliseconds();
    let step = span.num_milliseconds();
    ((total + step - 1) / step) as usize
}

/// Plan the windows needed to cover `range` at `resolution`.
pub fn plan(range: TimeRange, resolution: Resolution) -> Windows {
    Windows {
        cursor: range.start,
        end: range.end,
        span: resolution.window_span(),
    }
}
