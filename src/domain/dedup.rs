//! Duplicate suppression against stored candles.

use crate::domain::candle::{CandleRecord, Namespace};
use crate::domain::error::CandleError;
use crate::ports::store_port::CandleStore;
use std::collections::HashSet;

/// Return the candidates whose timestamp is not yet stored in `namespace`.
///
/// Issues exactly one existence lookup for the whole batch. Input order is
/// preserved, and a timestamp repeated within the batch is kept only once
/// (first occurrence wins).
pub fn filter(
    store: &dyn CandleStore,
    namespace: &Namespace,
    candidates: Vec<CandleRecord>,
) -> Result<Vec<CandleRecord>, CandleError> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let timestamps: Vec<i64> = candidates.iter().map(|c| c.timestamp).collect();
    let mut seen: HashSet<i64> = store.existing_timestamps(namespace, &timestamps)?;

    Ok(candidates
        .into_iter()
        .filter(|c| seen.insert(c.timestamp))
        .collect())
}
