//! Periodic and forced buffer flush.
//!
//! Grounded in `ws_tick_collector_multi.py`'s `_flush_loop`/`_flush_buffers`
//! (sleep, check `should_flush()` or non-empty, drain, write each non-empty
//! kind). `flush_once` is also called directly by the WS read loop when a
//! buffer fills mid-frame, so a retry can be attempted against freshly
//! drained space before the tick is counted as lost.

use crate::context::CollectorContext;
use deribit_core::{CoreError, DepthSnapshot, QuoteTick, TradeTick};
use tracing::{error, info};

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

/// Polls every 250ms; flushes when the configured interval has elapsed or
/// the buffer crosses 80% utilization, whichever comes first.
pub async fn run(ctx: CollectorContext) {
    let mut last_flush = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let due = last_flush.elapsed() >= ctx.config.flush_interval || ctx.buffer.should_flush();
        if due {
            if let Err(err) = flush_once(&ctx).await {
                error!(%err, "flush failed");
            }
            last_flush = tokio::time::Instant::now();
        }
    }
}

/// Drains and writes whatever is currently buffered, regardless of timer
/// state. Used both by the periodic loop and the WS read loop's
/// buffer-full fallback.
pub async fn flush_once(ctx: &CollectorContext) -> Result<(), CoreError> {
    let (quotes, trades, depth) = ctx.buffer.drain();
    if quotes.is_empty() && trades.is_empty() && depth.is_empty() {
        return Ok(());
    }
    write_drained(ctx, quotes, trades, depth).await
}

pub async fn write_drained(
    ctx: &CollectorContext,
    quotes: Vec<QuoteTick>,
    trades: Vec<TradeTick>,
    depth: Vec<DepthSnapshot>,
) -> Result<(), CoreError> {
    if !quotes.is_empty() {
        ctx.writer.write_quotes(&quotes).await?;
    }
    if !trades.is_empty() {
        ctx.writer.write_trades(&trades).await?;
    }
    if !depth.is_empty() {
        ctx.writer.write_depth(&depth).await?;
    }
    info!(quotes = quotes.len(), trades = trades.len(), depth = depth.len(), "flushed buffer");
    Ok(())
}
