//! Upstream market-data ports.

use crate::domain::candle::{CandleRecord, Product};
use crate::domain::error::FetchError;
use crate::domain::resolution::Resolution;
use crate::domain::time_window::Window;

/// Fetches the candles of one window. One call is one upstream request.
pub trait CandleSource {
    fn fetch(
        &self,
        product: &str,
        window: &Window,
        resolution: Resolution,
    ) -> Result<Vec<CandleRecord>, FetchError>;
}

/// Enumerates the tradable products.
pub trait ProductSource {
    fn list_products(&self) -> Result<Vec<Product>, FetchError>;
}
