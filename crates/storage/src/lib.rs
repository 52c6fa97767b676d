//! Idempotent batch writer and DAO layer, plus the `instrument_metadata`/
//! `lifecycle_events` DAOs the lifecycle manager reads and writes through
//! the same pooled client.
//!
//! Grounded in the original codebase's `db::Db` (one client, `batch_execute` for
//! session setup) and `dao::instrument_dao::replace_all_instruments`
//! (prepare + execute inside an explicit transaction), generalized from a
//! single bare client to a small `bb8` connection pool (2-5 connections)
//! and from single-row `execute` calls to multi-row
//! `INSERT ... VALUES (...),(...)...` batches.

pub mod instrument_dao;
pub mod lifecycle_dao;
pub mod pool;
pub mod upsert;
pub mod writer;

pub use pool::{connect_pool, PgPool};
pub use writer::{BatchWriter, InstrumentClass, TableScope};

/// A single SQL parameter whose concrete type has been erased so the
/// upsert builders can assemble `Vec`s of heterogeneous columns without
/// each caller hand-writing a fixed-arity tuple.
pub type SqlParam = Box<dyn postgres_types::ToSql + Sync + Send>;
