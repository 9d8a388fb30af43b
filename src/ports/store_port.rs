//! Candle storage port.

use crate::domain::candle::{CandleRecord, Namespace};
use crate::domain::error::CandleError;
use std::collections::HashSet;

/// Namespaced, append-only candle storage keyed by timestamp.
pub trait CandleStore {
    /// Create the collection backing `namespace` if it does not exist yet.
    fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), CandleError>;

    /// Which of `timestamps` are already stored, in a single lookup.
    fn existing_timestamps(
        &self,
        namespace: &Namespace,
        timestamps: &[i64],
    ) -> Result<HashSet<i64>, CandleError>;

    /// Insert `records` atomically: either all are written or none are.
    fn insert_batch(
        &self,
        namespace: &Namespace,
        records: &[CandleRecord],
    ) -> Result<usize, CandleError>;

    /// First timestamp, last timestamp and record count, if any are stored.
    fn namespace_stats(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<(i64, i64, usize)>, CandleError>;
}
