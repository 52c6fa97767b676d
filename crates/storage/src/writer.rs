//! `BatchWriter`: the one thing every collector task holds an `Arc` to when
//! it needs to persist ticks.
//!
//! Grounded in the original codebase's `db::Db::batch_execute` (fire-and-log a SQL
//! statement, log on failure) and `dao::instrument_dao::replace_all_instruments`'s
//! explicit-transaction chunking, generalized to a pooled, per-table-scope,
//! retrying writer.

use crate::pool::{connect_pool, PgPool};
use crate::upsert::{build_depth_insert, build_quote_upsert, build_trade_upsert};
use crate::SqlParam;
use deribit_core::{CoreError, Currency, DepthSnapshot, QuoteTick, TradeTick};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Rows per `INSERT` statement before the writer splits into another chunk.
/// Deribit ticker volume for a 250-instrument partition never approaches
/// this in one flush interval; it exists so a slow flush cycle can't emit
/// an unbounded single statement.
const MAX_CHUNK_ROWS: usize = 10_000;

const RETRY_BACKOFFS: [Duration; 3] =
    [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentClass {
    Option,
    Perpetual,
}

/// Which physical tables a `BatchWriter` targets: a
/// `{currency}_option_*` / `perpetuals_*` table-per-currency-per-kind split.
#[derive(Debug, Clone)]
pub struct TableScope {
    pub currency: Currency,
    pub class: InstrumentClass,
}

impl TableScope {
    pub fn new(currency: Currency, class: InstrumentClass) -> Self {
        Self { currency, class }
    }

    fn prefix(&self) -> String {
        match self.class {
            InstrumentClass::Option => format!("{}_option", self.currency.to_string().to_lowercase()),
            InstrumentClass::Perpetual => "perpetuals".to_string(),
        }
    }

    pub fn quotes_table(&self) -> String {
        format!("{}_quotes", self.prefix())
    }

    pub fn trades_table(&self) -> String {
        format!("{}_trades", self.prefix())
    }

    pub fn depth_table(&self) -> String {
        format!("{}_orderbook_depth", self.prefix())
    }
}

/// Pooled, retrying writer for one `(currency, instrument_class)` scope.
///
/// A collector process that tracks both options and a perpetual for the
/// same currency holds two `BatchWriter`s, one per `TableScope`: perpetual
/// and option rows live in separate tables rather than a shared
/// polymorphic one.
pub struct BatchWriter {
    pool: PgPool,
    scope: TableScope,
}

impl BatchWriter {
    pub async fn connect(database_url: &str, scope: TableScope) -> Result<Self, CoreError> {
        let pool = connect_pool(database_url).await?;
        Ok(Self { pool, scope })
    }

    pub fn scope(&self) -> &TableScope {
        &self.scope
    }

    pub async fn write_quotes(&self, rows: &[QuoteTick]) -> Result<usize, CoreError> {
        let table = self.scope.quotes_table();
        self.write_in_chunks(rows, MAX_CHUNK_ROWS, "quotes", |chunk| {
            build_quote_upsert(&table, chunk)
        })
        .await
    }

    pub async fn write_trades(&self, rows: &[TradeTick]) -> Result<usize, CoreError> {
        let table = self.scope.trades_table();
        self.write_in_chunks(rows, MAX_CHUNK_ROWS, "trades", |chunk| {
            build_trade_upsert(&table, chunk)
        })
        .await
    }

    pub async fn write_depth(&self, rows: &[DepthSnapshot]) -> Result<usize, CoreError> {
        let table = self.scope.depth_table();
        self.write_in_chunks(rows, MAX_CHUNK_ROWS, "depth", |chunk| {
            build_depth_insert(&table, chunk)
        })
        .await
    }

    async fn write_in_chunks<T>(
        &self,
        rows: &[T],
        chunk_size: usize,
        op: &str,
        build: impl Fn(&[T]) -> (String, Vec<SqlParam>),
    ) -> Result<usize, CoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        for chunk in rows.chunks(chunk_size) {
            let (sql, params) = build(chunk);
            self.write_chunk_with_retry(&sql, &params, chunk.len(), op).await?;
            written += chunk.len();
        }
        Ok(written)
    }

    async fn write_chunk_with_retry(
        &self,
        sql: &str,
        params: &[SqlParam],
        row_count: usize,
        op: &str,
    ) -> Result<(), CoreError> {
        let started = Instant::now();
        let mut last_err = None;

        for (attempt, backoff) in std::iter::once(Duration::ZERO).chain(RETRY_BACKOFFS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
            }
            match self.try_write_chunk(sql, params).await {
                Ok(()) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let rows_per_sec = if elapsed_ms > 0 {
                        (row_count as u64 * 1000) / elapsed_ms
                    } else {
                        row_count as u64
                    };
                    info!(
                        op,
                        rows = row_count,
                        elapsed_ms,
                        rows_per_sec,
                        table = %self.scope.prefix(),
                        "batch write committed"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(op, attempt, rows = row_count, error = %e, "batch write attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(CoreError::BatchWriteFailed {
            attempts: (RETRY_BACKOFFS.len() + 1) as u32,
            source: Box::new(last_err.expect("at least one attempt runs")),
        })
    }

    async fn try_write_chunk(&self, sql: &str, params: &[SqlParam]) -> Result<(), CoreError> {
        let conn = self.pool.get().await?;
        let refs: Vec<&(dyn postgres_types::ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as &(dyn postgres_types::ToSql + Sync)).collect();
        conn.execute(sql, &refs).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_follow_currency_and_class() {
        let options = TableScope::new(Currency::Btc, InstrumentClass::Option);
        assert_eq!(options.quotes_table(), "btc_option_quotes");
        assert_eq!(options.trades_table(), "btc_option_trades");
        assert_eq!(options.depth_table(), "btc_option_orderbook_depth");

        let perp = TableScope::new(Currency::Eth, InstrumentClass::Perpetual);
        assert_eq!(perp.quotes_table(), "perpetuals_quotes");
        assert_eq!(perp.trades_table(), "perpetuals_trades");
    }

    /// Simulates the COALESCE-merge an upsert performs, without a live
    /// Postgres: an existing non-null field must survive an incoming row
    /// whose corresponding field is null.
    #[test]
    fn coalesce_merge_never_nulls_out_existing_value() {
        fn coalesce(existing: Option<f64>, incoming: Option<f64>) -> Option<f64> {
            incoming.or(existing)
        }
        assert_eq!(coalesce(Some(1.0), None), Some(1.0));
        assert_eq!(coalesce(Some(1.0), Some(2.0)), Some(2.0));
        assert_eq!(coalesce(None, None), None);
        assert_eq!(coalesce(None, Some(2.0)), Some(2.0));
    }

    /// Requires a running Postgres with the fleet schema applied; run with
    /// `DATABASE_URL=... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn write_quotes_round_trips_against_live_postgres() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let writer = BatchWriter::connect(&database_url, TableScope::new(Currency::Btc, InstrumentClass::Option))
            .await
            .expect("connect");
        let rows = vec![QuoteTick::new(chrono::Utc::now(), "BTC-TEST-INTEGRATION")];
        let written = writer.write_quotes(&rows).await.expect("write");
        assert_eq!(written, 1);
    }
}
