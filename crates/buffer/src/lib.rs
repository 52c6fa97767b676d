//! Bounded in-memory tick buffer.
//!
//! Grounded in `tick_buffer.py`'s three `deque(maxlen=...)` behind one
//! `threading.Lock`: a single `Mutex` here guards all three queues and
//! their counters so a `drain()` can never observe them at different
//! instants.

use chrono::{DateTime, Utc};
use deribit_core::{CoreError, DepthSnapshot, QuoteTick, TradeTick};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_QUOTE_CAPACITY: usize = 200_000;
pub const DEFAULT_TRADE_CAPACITY: usize = 100_000;
pub const DEFAULT_DEPTH_CAPACITY: usize = 50_000;
pub const FLUSH_THRESHOLD_PCT: f64 = 80.0;
const WARNING_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct BufferCapacities {
    pub quotes: usize,
    pub trades: usize,
    pub depth: usize,
}

impl Default for BufferCapacities {
    fn default() -> Self {
        Self {
            quotes: DEFAULT_QUOTE_CAPACITY,
            trades: DEFAULT_TRADE_CAPACITY,
            depth: DEFAULT_DEPTH_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub received: u64,
    pub drained: u64,
    pub peak_utilization_pct: f64,
    /// Ticks lost to a full queue that a forced flush didn't relieve in
    /// time for the retry. Distinct from `received`/`drained`: these never
    /// made it into the buffer at all.
    pub discarded: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferStats {
    pub quotes: QueueStats,
    pub trades: QueueStats,
    pub depth: QueueStats,
    pub last_drain: Option<DateTime<Utc>>,
}

struct Inner {
    quotes: VecDeque<QuoteTick>,
    trades: VecDeque<TradeTick>,
    depth: VecDeque<DepthSnapshot>,
    stats: BufferStats,
    last_warned_quotes: Option<Instant>,
    last_warned_trades: Option<Instant>,
    last_warned_depth: Option<Instant>,
    last_warned_full_quotes: Option<Instant>,
    last_warned_full_trades: Option<Instant>,
    last_warned_full_depth: Option<Instant>,
}

/// Thread-safe FIFO buffer for quotes, trades, and depth snapshots.
///
/// `add_*` never evicts: once a queue is full, it returns
/// [`CoreError::BufferFull`] and the scheduling layer's flush loop is
/// responsible for draining before producers retry.
pub struct TickBuffer {
    caps: BufferCapacities,
    inner: Mutex<Inner>,
}

impl TickBuffer {
    pub fn new(caps: BufferCapacities) -> Self {
        Self {
            caps,
            inner: Mutex::new(Inner {
                quotes: VecDeque::with_capacity(caps.quotes.min(1024)),
                trades: VecDeque::with_capacity(caps.trades.min(1024)),
                depth: VecDeque::with_capacity(caps.depth.min(1024)),
                stats: BufferStats::default(),
                last_warned_quotes: None,
                last_warned_trades: None,
                last_warned_depth: None,
                last_warned_full_quotes: None,
                last_warned_full_trades: None,
                last_warned_full_depth: None,
            }),
        }
    }

    pub fn add_quote(&self, quote: QuoteTick) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.quotes.len() >= self.caps.quotes {
            return Err(CoreError::BufferFull {
                queue: "quotes",
                utilization_pct: utilization_pct(inner.quotes.len(), self.caps.quotes),
            });
        }
        inner.quotes.push_back(quote);
        inner.stats.quotes.received += 1;
        let utilization = utilization_pct(inner.quotes.len(), self.caps.quotes);
        inner.stats.quotes.peak_utilization_pct = inner.stats.quotes.peak_utilization_pct.max(utilization);
        if utilization >= FLUSH_THRESHOLD_PCT {
            warn_once(&mut inner.last_warned_quotes, "quotes", utilization);
        }
        Ok(())
    }

    pub fn add_trade(&self, trade: TradeTick) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.trades.len() >= self.caps.trades {
            return Err(CoreError::BufferFull {
                queue: "trades",
                utilization_pct: utilization_pct(inner.trades.len(), self.caps.trades),
            });
        }
        inner.trades.push_back(trade);
        inner.stats.trades.received += 1;
        let utilization = utilization_pct(inner.trades.len(), self.caps.trades);
        inner.stats.trades.peak_utilization_pct = inner.stats.trades.peak_utilization_pct.max(utilization);
        if utilization >= FLUSH_THRESHOLD_PCT {
            warn_once(&mut inner.last_warned_trades, "trades", utilization);
        }
        Ok(())
    }

    pub fn add_depth(&self, depth: DepthSnapshot) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.depth.len() >= self.caps.depth {
            return Err(CoreError::BufferFull {
                queue: "depth",
                utilization_pct: utilization_pct(inner.depth.len(), self.caps.depth),
            });
        }
        inner.depth.push_back(depth);
        inner.stats.depth.received += 1;
        let utilization = utilization_pct(inner.depth.len(), self.caps.depth);
        inner.stats.depth.peak_utilization_pct = inner.stats.depth.peak_utilization_pct.max(utilization);
        if utilization >= FLUSH_THRESHOLD_PCT {
            warn_once(&mut inner.last_warned_depth, "depth", utilization);
        }
        Ok(())
    }

    /// Atomically empties all three queues and returns their contents.
    /// No item pushed before this call returns can be lost or duplicated
    /// across the boundary.
    pub fn drain(&self) -> (Vec<QuoteTick>, Vec<TradeTick>, Vec<DepthSnapshot>) {
        let mut inner = self.lock();
        let quotes: Vec<_> = inner.quotes.drain(..).collect();
        let trades: Vec<_> = inner.trades.drain(..).collect();
        let depth: Vec<_> = inner.depth.drain(..).collect();

        inner.stats.quotes.drained += quotes.len() as u64;
        inner.stats.trades.drained += trades.len() as u64;
        inner.stats.depth.drained += depth.len() as u64;
        inner.stats.last_drain = Some(Utc::now());

        (quotes, trades, depth)
    }

    /// Records a tick lost after a forced flush still left the named queue
    /// full on retry. Logs at most once per minute per queue, separate from
    /// `warn_once`'s 80%-approaching warning above.
    pub fn record_discard(&self, queue: &'static str) {
        let mut inner = self.lock();
        match queue {
            "quotes" => {
                inner.stats.quotes.discarded += 1;
                let utilization = utilization_pct(inner.quotes.len(), self.caps.quotes);
                warn_once_discard(&mut inner.last_warned_full_quotes, queue, utilization);
            }
            "trades" => {
                inner.stats.trades.discarded += 1;
                let utilization = utilization_pct(inner.trades.len(), self.caps.trades);
                warn_once_discard(&mut inner.last_warned_full_trades, queue, utilization);
            }
            "depth" => {
                inner.stats.depth.discarded += 1;
                let utilization = utilization_pct(inner.depth.len(), self.caps.depth);
                warn_once_discard(&mut inner.last_warned_full_depth, queue, utilization);
            }
            _ => {}
        }
    }

    pub fn should_flush(&self) -> bool {
        let inner = self.lock();
        utilization_pct(inner.quotes.len(), self.caps.quotes) >= FLUSH_THRESHOLD_PCT
            || utilization_pct(inner.trades.len(), self.caps.trades) >= FLUSH_THRESHOLD_PCT
            || utilization_pct(inner.depth.len(), self.caps.depth) >= FLUSH_THRESHOLD_PCT
    }

    pub fn stats(&self) -> BufferStats {
        self.lock().stats
    }

    pub fn len_quotes(&self) -> usize {
        self.lock().quotes.len()
    }

    pub fn len_trades(&self) -> usize {
        self.lock().trades.len()
    }

    /// Discards everything without recording drain stats — emergency
    /// shutdown path only.
    pub fn clear_all(&self) {
        let mut inner = self.lock();
        let lost = inner.quotes.len() + inner.trades.len() + inner.depth.len();
        inner.quotes.clear();
        inner.trades.clear();
        inner.depth.clear();
        if lost > 0 {
            tracing::warn!(ticks_discarded = lost, "emergency buffer clear");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("tick buffer mutex poisoned")
    }
}

fn utilization_pct(len: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        (len as f64 / capacity as f64) * 100.0
    }
}

fn warn_once(last_warned: &mut Option<Instant>, queue: &'static str, utilization: f64) {
    let now = Instant::now();
    let due = match *last_warned {
        Some(prev) => now.duration_since(prev) > WARNING_COOLDOWN,
        None => true,
    };
    if due {
        tracing::warn!(queue, utilization_pct = utilization, "tick buffer approaching capacity");
        *last_warned = Some(now);
    }
}

fn warn_once_discard(last_warned: &mut Option<Instant>, queue: &'static str, utilization: f64) {
    let now = Instant::now();
    let due = match *last_warned {
        Some(prev) => now.duration_since(prev) > WARNING_COOLDOWN,
        None => true,
    };
    if due {
        tracing::warn!(queue, utilization_pct = utilization, "tick discarded: buffer still full after forced flush");
        *last_warned = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(instrument: &str) -> QuoteTick {
        QuoteTick::new(Utc::now(), instrument)
    }

    #[test]
    fn add_and_drain_round_trips() {
        let buf = TickBuffer::new(BufferCapacities { quotes: 10, trades: 10, depth: 10 });
        buf.add_quote(quote("A")).unwrap();
        buf.add_quote(quote("B")).unwrap();
        let (quotes, trades, depth) = buf.drain();
        assert_eq!(quotes.len(), 2);
        assert!(trades.is_empty());
        assert!(depth.is_empty());
    }

    #[test]
    fn full_queue_rejects_without_evicting() {
        let buf = TickBuffer::new(BufferCapacities { quotes: 2, trades: 10, depth: 10 });
        buf.add_quote(quote("A")).unwrap();
        buf.add_quote(quote("B")).unwrap();
        let err = buf.add_quote(quote("C")).unwrap_err();
        assert!(matches!(err, CoreError::BufferFull { queue: "quotes", .. }));
        assert_eq!(buf.len_quotes(), 2);
    }

    #[test]
    fn should_flush_at_80_percent() {
        let buf = TickBuffer::new(BufferCapacities { quotes: 10, trades: 10, depth: 10 });
        for _ in 0..7 {
            buf.add_quote(quote("A")).unwrap();
        }
        assert!(!buf.should_flush());
        buf.add_quote(quote("A")).unwrap();
        assert!(buf.should_flush());
    }

    #[test]
    fn drain_resets_queues_but_keeps_cumulative_stats() {
        let buf = TickBuffer::new(BufferCapacities { quotes: 10, trades: 10, depth: 10 });
        buf.add_quote(quote("A")).unwrap();
        buf.drain();
        buf.add_quote(quote("B")).unwrap();
        let stats = buf.stats();
        assert_eq!(stats.quotes.received, 2);
        assert_eq!(stats.quotes.drained, 1);
        assert_eq!(buf.len_quotes(), 1);
    }

    #[test]
    fn record_discard_increments_counter_independent_of_drain_stats() {
        let buf = TickBuffer::new(BufferCapacities { quotes: 2, trades: 10, depth: 10 });
        buf.add_quote(quote("A")).unwrap();
        buf.add_quote(quote("B")).unwrap();
        buf.add_quote(quote("C")).unwrap_err();
        buf.record_discard("quotes");
        buf.record_discard("quotes");
        assert_eq!(buf.stats().quotes.discarded, 2);
    }

    #[test]
    fn clear_all_discards_everything() {
        let buf = TickBuffer::new(BufferCapacities { quotes: 10, trades: 10, depth: 10 });
        buf.add_quote(quote("A")).unwrap();
        buf.clear_all();
        assert_eq!(buf.len_quotes(), 0);
    }

    #[test]
    fn concurrent_add_and_drain_never_loses_or_duplicates() {
        use std::sync::Arc;
        let buf = Arc::new(TickBuffer::new(BufferCapacities { quotes: 50_000, trades: 10, depth: 10 }));
        let writer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                for i in 0..5_000 {
                    buf.add_quote(quote(&format!("I{i}"))).unwrap();
                }
            })
        };

        let mut collected = Vec::new();
        loop {
            let (quotes, _, _) = buf.drain();
            collected.extend(quotes);
            if writer.is_finished() && buf.len_quotes() == 0 {
                let (remaining, _, _) = buf.drain();
                collected.extend(remaining);
                break;
            }
            std::thread::yield_now();
        }
        writer.join().unwrap();

        let mut names: Vec<String> = collected.into_iter().map(|q| q.instrument).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5_000, "every pushed item must appear exactly once across drains");
    }
}
