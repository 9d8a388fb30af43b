//! Core domain types and logic.

pub mod cancel;
pub mod candle;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod progress;
pub mod rate_limit;
pub mod resolution;
pub mod settings;
pub mod time_window;
