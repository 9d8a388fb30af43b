//! SQLite candle store: one table per namespace, keyed by timestamp.

use crate::domain::candle::{CandleRecord, Namespace};
use crate::domain::error::CandleError;
use crate::domain::settings::StorageSettings;
use crate::ports::store_port::CandleStore;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashSet;
use tracing::debug;

/// Bound parameters per existence query; SQLite builds before 3.32 cap a
/// statement at 999 variables.
const MAX_VARIABLES: usize = 900;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, CandleError> {
        let manager = SqliteConnectionManager::file(&settings.sqlite_path);
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| CandleError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, CandleError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| CandleError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, CandleError> {
        self.pool.get().map_err(|e: r2d2::Error| CandleError::Database {
            reason: e.to_string(),
        })
    }

    fn table_exists(
        conn: &rusqlite::Connection,
        namespace: &Namespace,
    ) -> Result<bool, CandleError> {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![namespace.collection_name()],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(query_err)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn query_err(e: rusqlite::Error) -> CandleError {
    CandleError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl CandleStore for SqliteAdapter {
    fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), CandleError> {
        let conn = self.conn()?;
        let table = quote_ident(&namespace.collection_name());
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                timestamp INTEGER PRIMARY KEY,
                low REAL NOT NULL,
                high REAL NOT NULL,
                open REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL
            );"
        ))
        .map_err(query_err)
    }

    fn existing_timestamps(
        &self,
        namespace: &Namespace,
        timestamps: &[i64],
    ) -> Result<HashSet<i64>, CandleError> {
        let mut existing = HashSet::new();
        if timestamps.is_empty() {
            return Ok(existing);
        }

        let conn = self.conn()?;
        if !Self::table_exists(&conn, namespace)? {
            return Ok(existing);
        }

        let table = quote_ident(&namespace.collection_name());
        for chunk in timestamps.chunks(MAX_VARIABLES) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let query = format!("SELECT timestamp FROM {table} WHERE timestamp IN ({placeholders})");
            let mut stmt = conn.prepare(&query).map_err(query_err)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))
                .map_err(query_err)?;
            for row in rows {
                existing.insert(row.map_err(query_err)?);
            }
        }

        debug!(
            collection = %namespace,
            candidates = timestamps.len(),
            existing = existing.len(),
            "existence check"
        );
        Ok(existing)
    }

    fn insert_batch(
        &self,
        namespace: &Namespace,
        records: &[CandleRecord],
    ) -> Result<usize, CandleError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let table = quote_ident(&namespace.collection_name());

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR IGNORE INTO {table} (timestamp, low, high, open, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ))
                .map_err(query_err)?;
            for r in records {
                inserted += stmt
                    .execute(params![r.timestamp, r.low, r.high, r.open, r.close, r.volume])
                    .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    fn namespace_stats(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<(i64, i64, usize)>, CandleError> {
        let conn = self.conn()?;
        if !Self::table_exists(&conn, namespace)? {
            return Ok(None);
        }

        let table = quote_ident(&namespace.collection_name());
        let result: (Option<i64>, Option<i64>, i64) = conn
            .query_row(
                &format!("SELECT MIN(timestamp), MAX(timestamp), COUNT(*) FROM {table}"),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(first), Some(last), count) if count > 0 => Ok(Some((first, last, count as usize))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resolution::Resolution;
    use crate::domain::settings::Settings;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn candle(ts: i64, close: f64) -> CandleRecord {
        CandleRecord {
            timestamp: ts,
            low: close - 1.0,
            high: close + 1.0,
            open: close,
            close,
            volume: 10.0,
        }
    }

    fn ns(product: &str) -> Namespace {
        Namespace::new(product, Resolution::OneMinute, "historical-candlestick-data")
    }

    #[test]
    fn in_memory_initialization() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.ensure_namespace(&ns("BTC-USD")).unwrap();
        adapter.ensure_namespace(&ns("BTC-USD")).unwrap();
    }

    #[test]
    fn insert_then_check_existing() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let ns = ns("BTC-USD");
        adapter.ensure_namespace(&ns).unwrap();

        let written = adapter
            .insert_batch(&ns, &[candle(60, 1.0), candle(120, 2.0)])
            .unwrap();
        assert_eq!(written, 2);

        let existing = adapter.existing_timestamps(&ns, &[0, 60, 120, 180]).unwrap();
        assert_eq!(existing, HashSet::from([60, 120]));
    }

    #[test]
    fn namespaces_are_isolated() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let btc = ns("BTC-USD");
        let eth = ns("ETH-USD");
        adapter.ensure_namespace(&btc).unwrap();
        adapter.ensure_namespace(&eth).unwrap();

        adapter.insert_batch(&btc, &[candle(60, 1.0)]).unwrap();
        assert!(adapter.existing_timestamps(&eth, &[60]).unwrap().is_empty());
    }

    #[test]
    fn existence_check_on_missing_table_is_empty() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let existing = adapter.existing_timestamps(&ns("NEW-USD"), &[1, 2, 3]).unwrap();
        assert!(existing.is_empty());
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let ns = ns("BTC-USD");
        adapter.ensure_namespace(&ns).unwrap();
        adapter.insert_batch(&ns, &[candle(60, 1.0)]).unwrap();

        let written = adapter
            .insert_batch(&ns, &[candle(60, 5.0), candle(120, 2.0)])
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(adapter.namespace_stats(&ns).unwrap(), Some((60, 120, 2)));
    }

    #[test]
    fn insert_into_missing_table_writes_nothing() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let ns = ns("BTC-USD");
        let result = adapter.insert_batch(&ns, &[candle(60, 1.0), candle(120, 2.0)]);
        assert!(matches!(result, Err(CandleError::DatabaseQuery { .. })));

        adapter.ensure_namespace(&ns).unwrap();
        assert_eq!(adapter.namespace_stats(&ns).unwrap(), None);
    }

    #[test]
    fn large_existence_check_spans_chunks() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let ns = ns("BTC-USD");
        adapter.ensure_namespace(&ns).unwrap();
        let records: Vec<_> = (0..2_000).map(|i| candle(i * 60, 1.0)).collect();
        adapter.insert_batch(&ns, &records).unwrap();

        let lookup: Vec<i64> = (0..2_500).map(|i| i * 60).collect();
        assert_eq!(adapter.existing_timestamps(&ns, &lookup).unwrap().len(), 2_000);
    }

    #[test]
    fn stats_of_missing_namespace_is_none() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        assert_eq!(adapter.namespace_stats(&ns("NONE-USD")).unwrap(), None);
    }

    #[test]
    fn from_settings_opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.sqlite3");
        let ini = format!("[sqlite]\npath = {}\n", path.display());
        let settings = Settings::from_config(&FileConfigAdapter::from_string(&ini).unwrap()).unwrap();

        let adapter = SqliteAdapter::from_settings(&settings.storage).unwrap();
        let ns = ns("BTC-USD");
        adapter.ensure_namespace(&ns).unwrap();
        adapter.insert_batch(&ns, &[candle(60, 1.0)]).unwrap();
        drop(adapter);

        let reopened = SqliteAdapter::from_settings(&settings.storage).unwrap();
        assert_eq!(reopened.namespace_stats(&ns).unwrap(), Some((60, 60, 1)));
    }
}
