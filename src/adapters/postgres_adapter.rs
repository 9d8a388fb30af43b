//! PostgreSQL candle store, enabled with the `postgres` feature.

use crate::domain::candle::{CandleRecord, Namespace};
use crate::domain::error::CandleError;
use crate::domain::settings::StorageSettings;
use crate::ports::store_port::CandleStore;
use postgres::{Client, NoTls};
use std::cell::RefCell;
use std::collections::HashSet;

pub struct PostgresAdapter {
    client: RefCell<Client>,
}

impl PostgresAdapter {
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, CandleError> {
        let mut config = postgres::Config::new();
        config
            .host(&settings.host)
            .port(settings.port)
            .dbname(&settings.database);
        if let Some(user) = &settings.user {
            config.user(user);
        }
        if let Some(password) = &settings.password {
            config.password(password);
        }

        let client = config.connect(NoTls).map_err(|e| CandleError::Database {
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: RefCell::new(client),
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn query_err(e: postgres::Error) -> CandleError {
    CandleError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl CandleStore for PostgresAdapter {
    fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), CandleError> {
        let table = quote_ident(&namespace.collection_name());
        self.client
            .borrow_mut()
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS public.{table} (
                    timestamp BIGINT PRIMARY KEY,
                    low DOUBLE PRECISION NOT NULL,
                    high DOUBLE PRECISION NOT NULL,
                    open DOUBLE PRECISION NOT NULL,
                    close DOUBLE PRECISION NOT NULL,
                    volume DOUBLE PRECISION NOT NULL
                )"
            ))
            .map_err(query_err)
    }

    fn existing_timestamps(
        &self,
        namespace: &Namespace,
        timestamps: &[i64],
    ) -> Result<HashSet<i64>, CandleError> {
        if timestamps.is_empty() {
            return Ok(HashSet::new());
        }

        let table = quote_ident(&namespace.collection_name());
        let wanted: Vec<i64> = timestamps.to_vec();
        let rows = self
            .client
            .borrow_mut()
            .query(
                &format!("SELECT timestamp FROM public.{table} WHERE timestamp = ANY($1)"),
                &[&wanted],
            )
            .map_err(query_err)?;

        Ok(rows.into_iter().map(|row| row.get::<_, i64>(0)).collect())
    }

    fn insert_batch(
        &self,
        namespace: &Namespace,
        records: &[CandleRecord],
    ) -> Result<usize, CandleError> {
        let table = quote_ident(&namespace.collection_name());
        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_err)?;

        let stmt = tx
            .prepare(&format!(
                "INSERT INTO public.{table} (timestamp, low, high, open, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (timestamp) DO NOTHING"
            ))
            .map_err(query_err)?;

        let mut inserted = 0;
        for r in records {
            inserted += tx
                .execute(
                    &stmt,
                    &[&r.timestamp, &r.low, &r.high, &r.open, &r.close, &r.volume],
                )
                .map_err(query_err)? as usize;
        }

        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    fn namespace_stats(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<(i64, i64, usize)>, CandleError> {
        let mut client = self.client.borrow_mut();
        let exists = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables
                                WHERE table_schema = 'public' AND table_name = $1::text)",
                &[&namespace.collection_name()],
            )
            .map_err(query_err)?
            .get::<_, bool>(0);
        if !exists {
            return Ok(None);
        }

        let table = quote_ident(&namespace.collection_name());
        let row = client
            .query_one(
                &format!("SELECT MIN(timestamp), MAX(timestamp), COUNT(*) FROM public.{table}"),
                &[],
            )
            .map_err(query_err)?;

        let first: Option<i64> = row.get(0);
        let last: Option<i64> = row.get(1);
        let count: i64 = row.get(2);

        match (first, last) {
            (Some(first), Some(last)) if count > 0 => Ok(Some((first, last, count as usize))),
            _ => Ok(None),
        }
    }
}
