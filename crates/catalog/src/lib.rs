//! Instrument catalog client.
//!
//! Grounded in `original_source/scripts/instrument_fetcher_multi.py`'s
//! `MultiCurrencyInstrumentFetcher` (1-hour cache, sort by open interest,
//! stale-cache-on-failure) and the original codebase's `kite::client::KiteClient`
//! (one shared `reqwest::Client`, a typed envelope, a private `get` helper).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use deribit_core::{CoreError, Currency, Instrument, InstrumentKind, OptionType, RateLimiter};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const DEFAULT_BASE_URL: &str = "https://www.deribit.com/api/v2";
const CACHE_TTL: Duration = Duration::from_secs(3600);
const RETRY_BACKOFFS: [Duration; 3] =
    [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];

type CacheKey = (Currency, InstrumentKind, bool);

struct CacheEntry {
    fetched_at: Instant,
    records: Vec<Instrument>,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < CACHE_TTL
    }
}

#[derive(Debug, Deserialize)]
struct DeribitEnvelope<T> {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<i64>,
    result: Option<T>,
    error: Option<DeribitRpcError>,
}

#[derive(Debug, Deserialize)]
struct DeribitRpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    instrument_name: String,
    kind: String,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    settlement_period: Option<String>,
    #[serde(default)]
    strike: Option<f64>,
    #[serde(default)]
    option_type: Option<String>,
    #[serde(default)]
    expiration_timestamp: Option<i64>,
}

/// REST-backed instrument catalog with a per-`(currency, kind, include_expired)`
/// cache, matching the Python fetcher's single-tuple cache generalized to a map
/// so one process can track several currencies/kinds at once.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    limiter: RateLimiter,
}

impl CatalogClient {
    pub fn new() -> Result<Self, CoreError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
            limiter: RateLimiter::default(),
        })
    }

    /// `list_instruments(currency, kind, include_expired)`
    ///
    /// `filter_expiring_within` additionally drops anything settling after
    /// `now + window` — used by the lifecycle manager to ask "what's
    /// about to expire" without a second round trip.
    pub async fn list_instruments(
        &self,
        currency: Currency,
        kind: InstrumentKind,
        include_expired: bool,
    ) -> Result<Vec<Instrument>, CoreError> {
        self.list_instruments_filtered(currency, kind, include_expired, None).await
    }

    pub async fn list_instruments_filtered(
        &self,
        currency: Currency,
        kind: InstrumentKind,
        include_expired: bool,
        filter_expiring_within: Option<ChronoDuration>,
    ) -> Result<Vec<Instrument>, CoreError> {
        let key = (currency, kind, include_expired);

        if let Some(entry) = self.cache.read().await.get(&key) {
            if entry.is_fresh() {
                tracing::debug!(?currency, ?kind, include_expired, "catalog cache hit");
                return Ok(apply_expiry_window(&entry.records, filter_expiring_within));
            }
        }

        match self.fetch_with_retry(currency, kind, include_expired).await {
            Ok(records) => {
                self.cache.write().await.insert(
                    key,
                    CacheEntry { fetched_at: Instant::now(), records: records.clone() },
                );
                Ok(apply_expiry_window(&records, filter_expiring_within))
            }
            Err(err) => {
                if let Some(entry) = self.cache.read().await.get(&key) {
                    tracing::warn!(?currency, ?kind, %err, "catalog fetch failed, serving stale cache");
                    return Ok(apply_expiry_window(&entry.records, filter_expiring_within));
                }
                Err(CoreError::CatalogUnavailable {
                    currency: currency.to_string(),
                    kind: kind.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        currency: Currency,
        kind: InstrumentKind,
        include_expired: bool,
    ) -> Result<Vec<Instrument>, CoreError> {
        let mut last_err = None;

        for (attempt, backoff) in std::iter::once(Duration::ZERO).chain(RETRY_BACKOFFS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
            }
            match self.fetch_once(currency, kind, include_expired).await {
                Ok(records) => return Ok(records),
                Err(err) => {
                    tracing::warn!(?currency, ?kind, attempt, %err, "catalog fetch attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }

    async fn fetch_once(
        &self,
        currency: Currency,
        kind: InstrumentKind,
        include_expired: bool,
    ) -> Result<Vec<Instrument>, CoreError> {
        self.limiter.acquire().await;

        let url = format!("{}/public/get_instruments", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("currency", currency.to_string()),
                ("kind", kind.to_string()),
                ("expired", include_expired.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(CoreError::ExchangeApi(format!("HTTP {status}: {text}")));
        }

        let envelope: DeribitEnvelope<Vec<RawInstrument>> = serde_json::from_str(&text)?;
        if let Some(rpc_err) = envelope.error {
            return Err(CoreError::ExchangeApi(rpc_err.message));
        }
        let raw = envelope.result.unwrap_or_default();

        let mut records: Vec<Instrument> = raw
            .into_iter()
            .filter(|r| include_expired || (r.is_active && r.settlement_period.as_deref() != Some("expired")))
            .map(|r| to_instrument(r, currency))
            .collect();

        // Stable sort by open interest descending, matching the Python
        // fetcher's `sorted(..., reverse=True)` — open interest is filled in
        // by a later ticker/REST pass in this codebase, so at catalog-fetch
        // time it's typically `None` and this just preserves API order.
        records.sort_by(|a, b| {
            b.open_interest
                .partial_cmp(&a.open_interest)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(records)
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new().expect("building the default reqwest client should never fail")
    }
}

fn to_instrument(raw: RawInstrument, currency: Currency) -> Instrument {
    let kind = match raw.kind.as_str() {
        "option" => InstrumentKind::Option,
        "future" => InstrumentKind::Future,
        _ => InstrumentKind::Perpetual,
    };
    let expiry = raw
        .expiration_timestamp
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms));

    Instrument {
        name: raw.instrument_name,
        currency,
        kind,
        strike: raw.strike,
        option_type: raw.option_type.as_deref().and_then(|s| s.parse::<OptionType>().ok()),
        expiry,
        is_active: raw.is_active,
        open_interest: None,
    }
}

fn apply_expiry_window(records: &[Instrument], window: Option<ChronoDuration>) -> Vec<Instrument> {
    let Some(window) = window else {
        return records.to_vec();
    };
    let cutoff = Utc::now() + window;
    records
        .iter()
        .filter(|r| matches!(r.expiry, Some(exp) if exp <= cutoff))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_response(names: &[&str]) -> String {
        let results: Vec<_> = names
            .iter()
            .map(|n| {
                serde_json::json!({
                    "instrument_name": n,
                    "kind": "option",
                    "is_active": true,
                    "settlement_period": "month",
                    "strike": 50000.0,
                    "option_type": "call",
                    "expiration_timestamp": 1_700_000_000_000i64,
                })
            })
            .collect();
        serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": results}).to_string()
    }

    #[tokio::test]
    async fn cold_cache_fetches_and_caches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/public/get_instruments.*".into()))
            .with_status(200)
            .with_body(options_response(&["BTC-1JAN26-50000-C"]))
            .expect(1)
            .create_async()
            .await;

        let client = CatalogClient::with_base_url(server.url()).unwrap();
        let first = client
            .list_instruments(Currency::Btc, InstrumentKind::Option, false)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = client
            .list_instruments(Currency::Btc, InstrumentKind::Option, false)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failure_with_no_cache_returns_catalog_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("/public/get_instruments.*".into()))
            .with_status(500)
            .expect(4)
            .create_async()
            .await;

        let client = CatalogClient::with_base_url(server.url()).unwrap();
        let err = client
            .list_instruments(Currency::Eth, InstrumentKind::Option, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CatalogUnavailable { .. }));
    }
}
