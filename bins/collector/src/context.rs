//! `CollectorContext`: the one piece of shared state every background task
//! (ws, flush, heartbeat, snapshot, refresh, control API) holds a clone of.
//! Tasks cooperate through this shared state; there's no message-passing
//! runtime between them beyond it.
//!
//! Grounded in the original codebase's `core::state::AppState` (one `Clone` struct of
//! `Arc`s handed to the axum router and background jobs alike).

use crate::config::CollectorConfig;
use deribit_buffer::TickBuffer;
use deribit_catalog::CatalogClient;
use deribit_snapshot::SnapshotFetcher;
use deribit_storage::BatchWriter;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct CollectorStats {
    pub ticks_processed: AtomicU64,
    pub quotes_received: AtomicU64,
    pub trades_received: AtomicU64,
    pub errors: AtomicU64,
}

impl CollectorStats {
    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            ticks_processed: self.ticks_processed.load(Ordering::Relaxed),
            quotes_received: self.quotes_received.load(Ordering::Relaxed),
            trades_received: self.trades_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CollectorStatsSnapshot {
    pub ticks_processed: u64,
    pub quotes_received: u64,
    pub trades_received: u64,
    pub errors: u64,
}

/// Resolves a pending JSON-RPC request id to its success/failure outcome
/// once the WS read loop sees the matching reply. The control API's
/// subscribe handler waits on this with a 5s timeout.
pub type PendingAcks = Arc<StdMutex<HashMap<u64, oneshot::Sender<bool>>>>;

#[derive(Clone)]
pub struct CollectorContext {
    pub config: Arc<CollectorConfig>,
    pub writer: Arc<BatchWriter>,
    pub buffer: Arc<TickBuffer>,
    pub catalog: Arc<CatalogClient>,
    pub snapshot: Arc<SnapshotFetcher>,
    pub owned: Arc<RwLock<HashSet<String>>>,
    /// Bumped whenever the owned-instrument set changes underneath the WS
    /// loop (hourly refresh or expiry); the WS loop polls this and, on
    /// mismatch, closes and reopens the connection to fully resubscribe
    /// rather than editing individual channels.
    pub generation: Arc<AtomicU64>,
    pub last_tick: Arc<StdMutex<Option<DateTime<Utc>>>>,
    pub stats: Arc<CollectorStats>,
    pub cancel: CancellationToken,
    /// Set by the WS session loop while a connection is live; control-API
    /// handlers use it to push raw subscribe/unsubscribe frames onto the
    /// active socket without owning the socket themselves.
    pub ws_commands: Arc<AsyncMutex<Option<mpsc::UnboundedSender<String>>>>,
    pub pending_acks: PendingAcks,
    pub request_id: Arc<AtomicU64>,
}

impl CollectorContext {
    pub fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_tick(&self) {
        self.stats.ticks_processed.fetch_add(1, Ordering::Relaxed);
        *self.last_tick.lock().expect("last_tick mutex poisoned") = Some(Utc::now());
    }

    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.lock().expect("last_tick mutex poisoned")
    }
}
