//! REST orderbook snapshot fetcher.
//!
//! Grounded in `original_source/scripts/orderbook_snapshot.py`'s
//! `OrderbookSnapshotter` (batched REST pulls, inter-batch sleep, "truly
//! dead" instruments dropped rather than written as all-null rows) and the
//! original codebase's `kite::client::KiteClient` single-`reqwest::Client`-
//! plus-typed-envelope shape. Feeds a `BatchWriter` directly: full-depth
//! snapshots never pass through the live tick buffer, since they're a bulk
//! catch-up/backfill path rather than the steady-state tick stream.

use chrono::Utc;
use deribit_core::{CoreError, DepthLevel, DepthSnapshot, QuoteTick, RateLimiter};
use deribit_storage::BatchWriter;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://www.deribit.com/api/v2";
const BATCH_SIZE: usize = 10;
const INTER_BATCH_DELAY: Duration = Duration::from_millis(500);
const TOP_OF_BOOK_DEPTH: u32 = 1;
const FULL_DEPTH: u32 = 20;

#[derive(Debug, Deserialize)]
struct OrderBookEnvelope {
    result: Option<RawOrderBook>,
    error: Option<RawRpcError>,
}

#[derive(Debug, Deserialize)]
struct RawRpcError {
    message: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawOrderBook {
    #[serde(default)]
    bids: Vec<(f64, f64)>,
    #[serde(default)]
    asks: Vec<(f64, f64)>,
    #[serde(default)]
    mark_price: Option<f64>,
    #[serde(default)]
    underlying_price: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
    #[serde(default)]
    stats: Option<RawStats>,
}

#[derive(Debug, Deserialize, Default)]
struct RawStats {
    #[serde(default)]
    volume: Option<f64>,
}

/// Outcome counters for one `fetch_and_populate` pass, logged at the end of
/// a collector's startup seed and each periodic re-snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotReport {
    pub seeded: usize,
    pub skipped_dead: usize,
    pub errors: usize,
}

pub struct SnapshotFetcher {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl SnapshotFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, base_url: DEFAULT_BASE_URL.to_string(), limiter: RateLimiter::default() }
    }

    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), limiter: RateLimiter::default() }
    }

    /// Pulls one order book per instrument in batches of `BATCH_SIZE`,
    /// concurrently within a batch, with `INTER_BATCH_DELAY` between
    /// batches to stay well under Deribit's rate limit alongside whatever
    /// the WS collector is doing on the same IP.
    pub async fn fetch_and_populate(
        &self,
        writer: &BatchWriter,
        instruments: &[String],
        include_full_depth: bool,
    ) -> Result<SnapshotReport, CoreError> {
        let depth = if include_full_depth { FULL_DEPTH } else { TOP_OF_BOOK_DEPTH };
        let mut report = SnapshotReport::default();

        for (batch_idx, batch) in instruments.chunks(BATCH_SIZE).enumerate() {
            if batch_idx > 0 {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }

            let results: Vec<_> = stream::iter(batch.iter().cloned())
                .map(|name| async move { self.fetch_one(&name, depth).await })
                .buffer_unordered(BATCH_SIZE)
                .collect()
                .await;

            let mut quotes = Vec::new();
            let mut depths = Vec::new();
            for outcome in results {
                match outcome {
                    Ok(Some((quote, depth_snapshot))) => {
                        quotes.push(quote);
                        if let Some(d) = depth_snapshot {
                            depths.push(d);
                        }
                    }
                    Ok(None) => report.skipped_dead += 1,
                    Err(err) => {
                        warn!(%err, "snapshot fetch failed for instrument");
                        report.errors += 1;
                    }
                }
            }

            report.seeded += quotes.len();
            if !quotes.is_empty() {
                writer.write_quotes(&quotes).await?;
            }
            if !depths.is_empty() {
                writer.write_depth(&depths).await?;
            }
        }

        info!(
            seeded = report.seeded,
            skipped_dead = report.skipped_dead,
            errors = report.errors,
            "snapshot pass complete"
        );
        Ok(report)
    }

    /// Fetches one instrument's order book. Returns `Ok(None)` for a
    /// "truly dead" instrument (no bid, no ask, no mark) rather than
    /// writing an all-null row.
    async fn fetch_one(
        &self,
        instrument: &str,
        depth: u32,
    ) -> Result<Option<(QuoteTick, Option<DepthSnapshot>)>, CoreError> {
        self.limiter.acquire().await;

        let url = format!("{}/public/get_order_book", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("instrument_name", instrument), ("depth", &depth.to_string())])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(CoreError::ExchangeApi(format!("HTTP {status}: {text}")));
        }

        let envelope: OrderBookEnvelope = serde_json::from_str(&text)?;
        if let Some(rpc_err) = envelope.error {
            return Err(CoreError::ExchangeApi(rpc_err.message));
        }
        let Some(book) = envelope.result else {
            return Ok(None);
        };

        let best_bid = book.bids.first().copied();
        let best_ask = book.asks.first().copied();

        if best_bid.is_none() && best_ask.is_none() && book.mark_price.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let mut quote = QuoteTick::new(now, instrument);
        quote.best_bid_price = best_bid.map(|(p, _)| p);
        quote.best_bid_amount = best_bid.map(|(_, a)| a);
        quote.best_ask_price = best_ask.map(|(p, _)| p);
        quote.best_ask_amount = best_ask.map(|(_, a)| a);
        quote.mark_price = book.mark_price;
        quote.underlying_price = book.underlying_price;
        quote.open_interest = book.open_interest;

        let depth_snapshot = if depth > TOP_OF_BOOK_DEPTH {
            Some(DepthSnapshot {
                timestamp: now,
                instrument: instrument.to_string(),
                bids: book.bids.iter().map(|&(price, size)| DepthLevel { price, size }).collect(),
                asks: book.asks.iter().map(|&(price, size)| DepthLevel { price, size }).collect(),
                mark_price: book.mark_price,
                underlying_price: book.underlying_price,
                open_interest: book.open_interest,
                volume_24h: book.stats.and_then(|s| s.volume),
            })
        } else {
            None
        };

        Ok(Some((quote, depth_snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_response(bid: f64, ask: f64) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "bids": [[bid, 10.0]],
                "asks": [[ask, 5.0]],
                "mark_price": (bid + ask) / 2.0,
                "underlying_price": 50000.0,
                "open_interest": 100.0,
                "stats": {"volume": 42.0},
            }
        })
        .to_string()
    }

    fn dead_response() -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"bids": [], "asks": []}
        })
        .to_string()
    }

    #[tokio::test]
    async fn live_book_produces_a_quote_and_no_depth_at_top_of_book() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("/public/get_order_book.*".into()))
            .with_status(200)
            .with_body(book_response(49900.0, 50100.0))
            .create_async()
            .await;

        let fetcher = SnapshotFetcher::with_base_url(reqwest::Client::new(), server.url());
        let outcome = fetcher.fetch_one("BTC-PERPETUAL", TOP_OF_BOOK_DEPTH).await.unwrap();
        let (quote, depth) = outcome.expect("live book yields a quote");
        assert_eq!(quote.best_bid_price, Some(49900.0));
        assert_eq!(quote.best_ask_price, Some(50100.0));
        assert!(depth.is_none());
    }

    #[tokio::test]
    async fn full_depth_request_also_returns_a_depth_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("/public/get_order_book.*".into()))
            .with_status(200)
            .with_body(book_response(49900.0, 50100.0))
            .create_async()
            .await;

        let fetcher = SnapshotFetcher::with_base_url(reqwest::Client::new(), server.url());
        let outcome = fetcher.fetch_one("BTC-PERPETUAL", FULL_DEPTH).await.unwrap();
        let (_, depth) = outcome.expect("live book yields a quote");
        assert!(depth.is_some());
    }

    #[tokio::test]
    async fn dead_instrument_is_skipped_not_written_as_nulls() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("/public/get_order_book.*".into()))
            .with_status(200)
            .with_body(dead_response())
            .create_async()
            .await;

        let fetcher = SnapshotFetcher::with_base_url(reqwest::Client::new(), server.url());
        let outcome = fetcher.fetch_one("BTC-DEAD-OPTION", TOP_OF_BOOK_DEPTH).await.unwrap();
        assert!(outcome.is_none());
    }
}
