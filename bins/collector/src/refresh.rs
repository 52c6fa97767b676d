//! Instrument refresh: re-fetches the catalog,
//! re-partitions, and bumps the generation counter that signals the WS
//! session loop to close and reopen with a fresh subscribe list.
//!
//! Grounded in `ws_tick_collector_multi.py`'s `_instrument_refresh_loop`
//! (hourly timer) and `instrument_expiry_checker.py`'s `filter_expired_instruments`
//! (per-name expiry check against the currently-owned set) combined into
//! one check: refresh on whichever comes first, an hourly timer or any
//! owned instrument crossing its expiry buffer.

use crate::context::CollectorContext;
use deribit_core::{CoreError, InstrumentKind};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, info};

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(ctx: CollectorContext) {
    let mut last_full_refresh = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(CHECK_INTERVAL) => {}
        }

        let any_expired = {
            let owned = ctx.owned.read().await;
            let now = chrono::Utc::now();
            owned.iter().any(|name| deribit_expiry::is_expired(name, now, deribit_expiry::DEFAULT_BUFFER))
        };
        let hourly_due = last_full_refresh.elapsed() >= ctx.config.instrument_refresh_interval;

        if any_expired || hourly_due {
            info!(any_expired, hourly_due, "refreshing instrument set");
            match refresh_instruments(&ctx).await {
                Ok(()) => last_full_refresh = tokio::time::Instant::now(),
                Err(err) => error!(%err, "instrument refresh failed"),
            }
        }
    }
}

/// Re-fetches the active catalog for this currency, re-partitions for this
/// connection id, replaces the owned set, and bumps the generation counter.
/// The WS session loop observes the bump on its own 5s poll and reconnects
/// with the new set: always a full reconnect, never per-channel edits.
pub async fn refresh_instruments(ctx: &CollectorContext) -> Result<(), CoreError> {
    let instruments = ctx
        .catalog
        .list_instruments(ctx.config.currency, InstrumentKind::Option, false)
        .await?;

    let names: Vec<String> = instruments.into_iter().map(|i| i.name).collect();
    let partition = deribit_partition::partition_for_connection(
        &names,
        ctx.config.top_n_instruments,
        ctx.config.connection_id,
    )
    .map_err(|_| CoreError::PartitionOutOfRange {
        connection_id: ctx.config.connection_id,
        partitions: names.len().div_ceil(ctx.config.top_n_instruments.max(1)),
    })?;

    {
        let mut owned = ctx.owned.write().await;
        *owned = partition.into_iter().collect();
    }

    ctx.generation.fetch_add(1, Ordering::SeqCst);
    Ok(())
}
