//! Coinbase Exchange public REST adapter.
//!
//! Candles come from `GET /products/{id}/candles` as rows of
//! `[time, low, high, open, close, volume]`, newest first. The adapter maps
//! rows positionally, returns them oldest first, and classifies failures
//! into [`FetchError`] kinds. Pacing is the caller's job.

use crate::domain::candle::{CandleRecord, Product};
use crate::domain::error::{CandleError, FetchError};
use crate::domain::resolution::Resolution;
use crate::domain::settings::UpstreamSettings;
use crate::domain::time_window::Window;
use crate::ports::candle_port::{CandleSource, ProductSource};
use chrono::SecondsFormat;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const USER_AGENT: &str = concat!("candlescrape/", env!("CARGO_PKG_VERSION"));

/// Columns of one upstream candle row.
const ROW_COLUMNS: usize = 6;

#[derive(Debug, Deserialize)]
struct ProductDto {
    id: String,
    display_name: Option<String>,
    #[serde(default)]
    trading_disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDto {
    message: String,
}

pub struct CoinbaseAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinbaseAdapter {
    pub fn from_settings(settings: &UpstreamSettings) -> Result<Self, CandleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CandleError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Query parameters for one candle request.
    fn candle_query(window: &Window, resolution: Resolution) -> [(&'static str, String); 3] {
        [
            (
                "start",
                window.start().to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("end", window.end().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("granularity", resolution.granularity_secs().to_string()),
        ]
    }

    /// GET `path` and return the body of a successful response.
    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| FetchError::Transient {
                reason: format!("request to {url} failed: {e}"),
            })?;

        let status = resp.status();
        let body = resp.text().map_err(|e| FetchError::Transient {
            reason: format!("reading response from {url} failed: {e}"),
        })?;

        if status.is_success() {
            return Ok(body);
        }

        let reason = serde_json::from_str::<ApiErrorDto>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(FetchError::Transient {
                reason: format!("HTTP {status}: {reason}"),
            })
        } else {
            Err(FetchError::Rejected {
                status: status.as_u16(),
                reason,
            })
        }
    }
}

impl CandleSource for CoinbaseAdapter {
    fn fetch(
        &self,
        product: &str,
        window: &Window,
        resolution: Resolution,
    ) -> Result<Vec<CandleRecord>, FetchError> {
        let path = format!("/products/{product}/candles");
        let body = self.get(&path, &Self::candle_query(window, resolution))?;
        let mut candles = parse_candles(&body)?;

        // Upstream treats `end` as inclusive; windows are half-open.
        let bounds = window.start().timestamp()..window.end().timestamp();
        let received = candles.len();
        candles.retain(|c| bounds.contains(&c.timestamp));
        debug!(
            product,
            window = %window,
            count = candles.len(),
            dropped = received - candles.len(),
            "fetched candles"
        );
        Ok(candles)
    }
}

impl ProductSource for CoinbaseAdapter {
    fn list_products(&self) -> Result<Vec<Product>, FetchError> {
        let body = self.get("/products", &[])?;
        parse_products(&body)
    }
}

/// Decode a candle response body, oldest candle first.
pub fn parse_candles(body: &str) -> Result<Vec<CandleRecord>, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse {
        reason: format!("body is not JSON: {e}"),
    })?;

    let rows = value.as_array().ok_or_else(|| FetchError::MalformedResponse {
        reason: "expected an array of candle rows".to_string(),
    })?;

    let mut candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_row(i, row))
        .collect::<Result<Vec<_>, _>>()?;

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn parse_row(index: usize, row: &Value) -> Result<CandleRecord, FetchError> {
    let cols = row.as_array().ok_or_else(|| FetchError::MalformedResponse {
        reason: format!("row {index} is not an array"),
    })?;
    if cols.len() != ROW_COLUMNS {
        return Err(FetchError::MalformedResponse {
            reason: format!(
                "row {index} has {} columns, expected {ROW_COLUMNS}",
                cols.len()
            ),
        });
    }

    let num = |col: usize, name: &str| -> Result<f64, FetchError> {
        let v = &cols[col];
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
            .filter(|n| n.is_finite())
            .ok_or_else(|| FetchError::MalformedResponse {
                reason: format!("row {index} field '{name}' is not numeric: {v}"),
            })
    };

    let time = num(0, "time")?;
    if time.fract() != 0.0 {
        return Err(FetchError::MalformedResponse {
            reason: format!("row {index} time {time} is not a whole second"),
        });
    }

    Ok(CandleRecord {
        timestamp: time as i64,
        low: num(1, "low")?,
        high: num(2, "high")?,
        open: num(3, "open")?,
        close: num(4, "close")?,
        volume: num(5, "volume")?,
    })
}

/// Decode a product listing, sorted by id.
pub fn parse_products(body: &str) -> Result<Vec<Product>, FetchError> {
    let dtos: Vec<ProductDto> =
        serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse {
            reason: format!("unexpected product listing: {e}"),
        })?;

    let mut products: Vec<Product> = dtos
        .into_iter()
        .map(|p| Product {
            id: p.id,
            display_name: p.display_name,
            trading_disabled: p.trading_disabled,
        })
        .collect();
    products.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(products)
}
