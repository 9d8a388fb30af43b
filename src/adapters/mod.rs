//! Concrete adapter implementations for ports.

#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod coinbase_adapter;
pub mod file_config_adapter;
pub mod interrupt;
pub mod terminal_progress;
