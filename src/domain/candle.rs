//! Candle records, products and storage namespaces.

use crate::domain::resolution::Resolution;
use chrono::{DateTime, Utc};
use std::fmt;

/// One price candle. `timestamp` (unix seconds, candle open) is the natural
/// key within a namespace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleRecord {
    pub timestamp: i64,
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRecord {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// A tradable instrument as listed upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub display_name: Option<String>,
    pub trading_disabled: bool,
}

impl Product {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            trading_disabled: false,
        }
    }
}

/// The (product, resolution) key space a batch of candles belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    product: String,
    resolution: Resolution,
    suffix: String,
}

impl Namespace {
    pub fn new(product: &str, resolution: Resolution, suffix: &str) -> Self {
        Self {
            product: product.to_string(),
            resolution,
            suffix: suffix.to_string(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// `{product-id-lowercase}-{resolution-label}-{suffix}`
    pub fn collection_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.product.to_lowercase(),
            self.resolution.label(),
            self.suffix
        )
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection_name())
    }
}
