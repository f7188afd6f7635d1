//! PostgreSQL Durable Sink
//!
//! Append-only candle persistence with two-tier failure handling:
//! per-row failures are isolated with savepoints and do not abort the
//! batch; a commit failure rolls back the whole batch so readers never
//! observe a half-committed one.
//!
//! # Time conversion boundary
//!
//! The pipeline carries kline start times as integer epoch
//! milliseconds. The single milliseconds→timestamp conversion in the
//! whole system is the `to_timestamp(... / 1000.0)` expression in
//! [`INSERT_CANDLE_SQL`]. Nothing upstream or downstream rescales;
//! rescaling twice silently corrupts data.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::application::ports::{CandleStore, StoreError, WriteReport};
use crate::domain::candle::CandleRecord;

/// Destination schema, table, and indexes. Every statement is
/// idempotent (`IF NOT EXISTS`) so re-running against a prior
/// deployment is safe.
const ENSURE_SCHEMA_SQL: &str = r"
CREATE SCHEMA IF NOT EXISTS ohlcv_stream;

CREATE TABLE IF NOT EXISTS ohlcv_stream.ohlcv_data (
    time timestamptz NOT NULL,
    symbol text NOT NULL,
    open numeric,
    high numeric,
    low numeric,
    close numeric,
    volume numeric,
    ingested_at timestamptz NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_ohlcv_stream_time ON ohlcv_stream.ohlcv_data (time DESC);
CREATE INDEX IF NOT EXISTS idx_ohlcv_stream_symbol ON ohlcv_stream.ohlcv_data (symbol);
CREATE INDEX IF NOT EXISTS idx_ohlcv_stream_ingested ON ohlcv_stream.ohlcv_data (ingested_at DESC);
";

/// Append-only insert; no conflict handling, the deduplicator upstream
/// is the only duplicate defense. `$1` is epoch milliseconds.
const INSERT_CANDLE_SQL: &str = r"
INSERT INTO ohlcv_stream.ohlcv_data (time, symbol, open, high, low, close, volume)
VALUES (to_timestamp($1::double precision / 1000.0), $2, $3, $4, $5, $6, $7)
";

/// Durable PostgreSQL-backed candle store.
#[derive(Debug, Clone)]
pub struct PostgresCandleStore {
    pool: PgPool,
    commit_timeout: Duration,
}

impl PostgresCandleStore {
    /// Connect a new store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the pool cannot be
    /// established.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        commit_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(max_connections, "PostgreSQL connection pool initialized");

        Ok(Self {
            pool,
            commit_timeout,
        })
    }

    /// Build a store over an existing pool (for tests).
    #[must_use]
    pub const fn with_pool(pool: PgPool, commit_timeout: Duration) -> Self {
        Self {
            pool,
            commit_timeout,
        }
    }
}

#[async_trait]
impl CandleStore for PostgresCandleStore {
    async fn ensure_schema(&self) {
        match sqlx::raw_sql(ENSURE_SCHEMA_SQL).execute(&self.pool).await {
            Ok(_) => tracing::info!("candle schema and table ready"),
            // Non-fatal: a pre-existing schema from a prior deployment
            // is the common case. If the table truly does not exist,
            // writes will fail visibly and be reported.
            Err(err) => tracing::warn!(error = %err, "schema ensure failed, proceeding"),
        }
    }

    async fn write(&self, batch: &[CandleRecord]) -> Result<WriteReport, StoreError> {
        if batch.is_empty() {
            return Ok(WriteReport::default());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut report = WriteReport::default();

        for record in batch {
            // Postgres aborts the whole transaction on any statement
            // error, so each row gets a savepoint to confine failures.
            sqlx::query("SAVEPOINT candle_row")
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            let inserted = sqlx::query(INSERT_CANDLE_SQL)
                .bind(record.time_ms)
                .bind(&record.symbol)
                .bind(record.open)
                .bind(record.high)
                .bind(record.low)
                .bind(record.close)
                .bind(record.volume)
                .execute(&mut *tx)
                .await;

            match inserted {
                Ok(_) => {
                    sqlx::query("RELEASE SAVEPOINT candle_row")
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StoreError::Connection(e.to_string()))?;
                    report.accepted += 1;
                }
                Err(err) => {
                    // Full record content goes to the log for manual
                    // recovery; the batch continues without this row.
                    tracing::error!(
                        error = %err,
                        symbol = %record.symbol,
                        time_ms = record.time_ms,
                        record = %serde_json::to_string(record).unwrap_or_default(),
                        "row insert failed, continuing batch"
                    );
                    sqlx::query("ROLLBACK TO SAVEPOINT candle_row")
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StoreError::Connection(e.to_string()))?;
                    report.failed += 1;
                }
            }
        }

        match tokio::time::timeout(self.commit_timeout, tx.commit()).await {
            Ok(Ok(())) => Ok(report),
            Ok(Err(err)) => Err(StoreError::Commit(err.to_string())),
            // Dropping the timed-out commit future drops the
            // transaction, which rolls back on the connection's return
            // to the pool.
            Err(_) => Err(StoreError::CommitTimeout(self.commit_timeout)),
        }
    }
}
