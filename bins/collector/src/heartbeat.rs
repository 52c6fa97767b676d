//! Heartbeat monitor.
//!
//! Grounded in `ws_tick_collector_multi.py`'s `_heartbeat_monitor`: warn at
//! 10s of silence, trigger an instrument refresh at 300s (most likely cause
//! is every owned instrument having expired out from under the connection).

use crate::context::CollectorContext;
use crate::refresh;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, warn};

const CHECK_INTERVAL: Duration = Duration::from_secs(10);
const WARN_THRESHOLD: Duration = Duration::from_secs(10);
const REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

pub async fn run(ctx: CollectorContext) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(CHECK_INTERVAL) => {}
        }

        let Some(last_tick) = ctx.last_tick_at() else {
            continue;
        };
        let silence = Utc::now().signed_duration_since(last_tick);
        let Ok(silence) = silence.to_std() else {
            continue;
        };

        if silence > WARN_THRESHOLD {
            warn!(silence_secs = silence.as_secs(), "no ticks received");
        }

        if silence > REFRESH_THRESHOLD {
            error!(silence_secs = silence.as_secs(), "prolonged silence, forcing instrument refresh");
            if let Err(err) = refresh::refresh_instruments(&ctx).await {
                error!(%err, "heartbeat-triggered instrument refresh failed");
            }
        }
    }
}
