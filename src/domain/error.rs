//! Domain error types.

use chrono::{DateTime, Utc};

/// Failure of a single upstream candle request.
///
/// The fetcher only classifies; whether a failure is retried is decided by
/// the retrieval engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Timeouts, connection failures, throttling and server-side errors.
    #[error("transient upstream failure: {reason}")]
    Transient { reason: String },

    /// The upstream answered, but the payload does not have the candle shape.
    #[error("malformed upstream response: {reason}")]
    MalformedResponse { reason: String },

    /// The upstream refused the request (unknown product, bad parameters).
    #[error("upstream rejected request (HTTP {status}): {reason}")]
    Rejected { status: u16, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Raised when an external cancellation signal has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Top-level error type for candlescrape.
#[derive(Debug, thiserror::Error)]
pub enum CandleError {
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&CandleError> for std::process::ExitCode {
    fn from(err: &CandleError) -> Self {
        let code: u8 = match err {
            CandleError::Io(_) => 1,
            CandleError::ConfigParse { .. }
            | CandleError::ConfigMissing { .. }
            | CandleError::ConfigInvalid { .. } => 2,
            CandleError::Database { .. } | CandleError::DatabaseQuery { .. } => 3,
            CandleError::InvalidRange { .. } | CandleError::InvalidArgument { .. } => 4,
            CandleError::Fetch(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
