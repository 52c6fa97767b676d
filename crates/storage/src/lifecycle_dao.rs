//! `lifecycle_events` DAO — an append-only audit log of every listed/expired/
//! subscribe/unsubscribe outcome the lifecycle manager produces, so a human
//! can answer "why did collector 3 stop ticking BTC-1AUG26-60000-C" without
//! grepping logs across machines.

use deribit_core::{CoreError, LifecycleEvent};

use crate::PgPool;

pub async fn log_event(pool: &PgPool, event: &LifecycleEvent) -> Result<(), CoreError> {
    let conn = pool.get().await?;
    let kind = serde_json::to_value(event.kind)?
        .as_str()
        .expect("LifecycleEventKind serializes to a string")
        .to_string();
    conn.execute(
        "INSERT INTO lifecycle_events \
            (event_time, kind, instrument, currency, collector_id, success, error, details) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        &[
            &event.event_time,
            &kind,
            &event.instrument,
            &event.currency.to_string(),
            &event.collector_id,
            &event.success,
            &event.error,
            &event.details,
        ],
    )
    .await?;
    Ok(())
}
