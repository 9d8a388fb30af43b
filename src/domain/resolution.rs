//! Candle resolutions and their fixed per-resolution parameters.
//!
//! Every mapping is an exhaustive `match`, so adding a variant without
//! giving it a label, a granularity, a window span and a lookback is a
//! compile error rather than a silently missing table entry.

use chrono::TimeDelta;
use std::fmt;
use std::str::FromStr;

/// Sampling granularity of a candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    SixHours,
    OneDay,
}

impl Resolution {
    pub const ALL: [Resolution; 6] = [
        Resolution::OneMinute,
        Resolution::FiveMinutes,
        Resolution::FifteenMinutes,
        Resolution::OneHour,
        Resolution::SixHours,
        Resolution::OneDay,
    ];

    /// Canonical label, used for CLI parsing and storage namespaces.
    pub fn label(self) -> &'static str {
        match self {
            Resolution::OneMinute => "1m",
            Resolution::FiveMinutes => "5m",
            Resolution::FifteenMinutes => "15m",
            Resolution::OneHour => "1hr",
            Resolution::SixHours => "6h",
            Resolution::OneDay => "1d",
        }
    }

    /// Candle width in seconds, as the upstream `granularity` parameter.
    pub fn granularity_secs(self) -> i64 {
        match self {
            Resolution::OneMinute => 60,
            Resolution::FiveMinutes => 300,
            Resolution::FifteenMinutes => 900,
            Resolution::OneHour => 3_600,
            Resolution::SixHours => 21_600,
            Resolution::OneDay => 86_400,
        }
    }

    /// Span of a single upstream request at this resolution.
    pub fn window_span(self) -> TimeDelta {
        match self {
            Resolution::OneMinute => TimeDelta::hours(4),
            Resolution::FiveMinutes => TimeDelta::hours(24),
            Resolution::FifteenMinutes => TimeDelta::hours(72),
            Resolution::OneHour => TimeDelta::hours(288),
            Resolution::SixHours => TimeDelta::hours(1_728),
            Resolution::OneDay => TimeDelta::hours(7_200),
        }
    }

    /// Range fetched when the caller gives no explicit start and end.
    pub fn default_lookback(self) -> TimeDelta {
        match self {
            Resolution::OneMinute => TimeDelta::days(1),
            Resolution::FiveMinutes => TimeDelta::days(5),
            Resolution::FifteenMinutes => TimeDelta::days(15),
            Resolution::OneHour => TimeDelta::days(30),
            Resolution::SixHours => TimeDelta::days(180),
            Resolution::OneDay => TimeDelta::days(365),
        }
    }

    pub fn labels() -> [&'static str; 6] {
        Self::ALL.map(Resolution::label)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resolution '{0}' (expected one of 1m, 5m, 15m, 1hr, 6h, 1d)")]
pub struct UnknownResolution(pub String);

impl FromStr for Resolution {
    type Err = UnknownResolution;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.label() == wanted)
            .ok_or_else(|| UnknownResolution(s.to_string()))
    }
}
