//! Periodic full-depth re-snapshot.
//!
//! The startup seed snapshot runs once in `main` before any task spawns;
//! this task repeats it on `snapshot_interval` to keep `*_orderbook_depth`
//! fresh for instruments that never trade (and so never get a depth row
//! from the tick stream, since `book.*` isn't subscribed).

use crate::context::CollectorContext;
use deribit_core::CoreError;
use tracing::error;

pub async fn run_once(ctx: &CollectorContext, include_full_depth: bool) -> Result<(), CoreError> {
    let instruments: Vec<String> = ctx.owned.read().await.iter().cloned().collect();
    ctx.snapshot.fetch_and_populate(&ctx.writer, &instruments, include_full_depth).await?;
    Ok(())
}

/// Ticks on `config.snapshot_interval`; skips the immediate first tick
/// since `main` already ran a startup snapshot before spawning tasks.
pub async fn run_periodic(ctx: CollectorContext) {
    let mut interval = tokio::time::interval(ctx.config.snapshot_interval);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(err) = run_once(&ctx, true).await {
            error!(%err, "periodic snapshot failed");
        }
    }
}
