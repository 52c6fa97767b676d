//! `instrument_metadata` DAO — the table the lifecycle manager diffs
//! against to compute listed/expired instruments, and that a collector's
//! control API reads when asked for current status.
//!
//! Grounded in the original codebase's `dao::instrument_dao` (prepared statements,
//! explicit columns, no ORM), generalized from Kite's single `instruments`
//! table to a schema carrying `is_active`/`listed_at`/`expired_at` so the
//! lifecycle manager's diff cycle has somewhere to read and write state.

use deribit_core::{CoreError, Currency, Instrument};
use std::collections::HashSet;

use crate::PgPool;

/// Instrument names currently marked active for `currency` in
/// `instrument_metadata` — the "tracked" side of the lifecycle diff.
pub async fn tracked_active(pool: &PgPool, currency: Currency) -> Result<HashSet<String>, CoreError> {
    let conn = pool.get().await?;
    let rows = conn
        .query(
            "SELECT name FROM instrument_metadata WHERE currency = $1 AND is_active = TRUE",
            &[&currency.to_string()],
        )
        .await?;
    Ok(rows.into_iter().map(|r| r.get::<_, String>(0)).collect())
}

/// Upserts a newly-listed instrument as active. Idempotent: re-listing an
/// already-tracked instrument just refreshes `listed_at`.
pub async fn insert_listed(pool: &PgPool, instrument: &Instrument) -> Result<(), CoreError> {
    let conn = pool.get().await?;
    conn.execute(
        "INSERT INTO instrument_metadata \
            (name, currency, kind, strike, option_type, expiry, is_active, listed_at, last_seen_at) \
         VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW(), NOW()) \
         ON CONFLICT (name) DO UPDATE SET \
            is_active = TRUE, listed_at = NOW(), last_seen_at = NOW(), expired_at = NULL",
        &[
            &instrument.name,
            &instrument.currency.to_string(),
            &instrument.kind.to_string(),
            &instrument.strike,
            &instrument.option_type.map(|o| format!("{o:?}").to_lowercase()),
            &instrument.expiry,
        ],
    )
    .await?;
    Ok(())
}

/// Marks an instrument inactive. Never deletes the row — `lifecycle_events`
/// and historical tick tables still reference the name.
pub async fn mark_expired(pool: &PgPool, name: &str) -> Result<(), CoreError> {
    let conn = pool.get().await?;
    conn.execute(
        "UPDATE instrument_metadata SET is_active = FALSE, expired_at = NOW() WHERE name = $1",
        &[&name],
    )
    .await?;
    Ok(())
}

/// Bulk-refreshes `last_seen_at` for every instrument still active this
/// cycle, so a row's absence from this update is itself a staleness signal.
pub async fn touch_last_seen(pool: &PgPool, names: &[String]) -> Result<(), CoreError> {
    if names.is_empty() {
        return Ok(());
    }
    let conn = pool.get().await?;
    conn.execute(
        "UPDATE instrument_metadata SET last_seen_at = NOW() WHERE name = ANY($1)",
        &[&names],
    )
    .await?;
    Ok(())
}
