//! Fan-out to every collector's control API, generalized from
//! `_unsubscribe_from_collectors`/`_subscribe_to_collectors`'s per-consumer
//! calls: this fleet doesn't route by instrument ownership, so every
//! collector gets every subscribe/unsubscribe call and silently ignores
//! instruments it doesn't own, rather than the manager tracking
//! per-connection ownership itself.

use deribit_core::{CoreError, RateLimiter};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One outcome per endpoint; a failing endpoint never aborts the fan-out.
pub async fn fan_out_subscribe(
    http: &reqwest::Client,
    limiter: &RateLimiter,
    endpoints: &[String],
    instrument: &str,
) -> Vec<(String, Result<(), CoreError>)> {
    fan_out(http, limiter, endpoints, "api/subscribe", instrument).await
}

pub async fn fan_out_unsubscribe(
    http: &reqwest::Client,
    limiter: &RateLimiter,
    endpoints: &[String],
    instrument: &str,
) -> Vec<(String, Result<(), CoreError>)> {
    fan_out(http, limiter, endpoints, "api/unsubscribe", instrument).await
}

async fn fan_out(
    http: &reqwest::Client,
    limiter: &RateLimiter,
    endpoints: &[String],
    path: &str,
    instrument: &str,
) -> Vec<(String, Result<(), CoreError>)> {
    let mut results = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), path);
        let outcome = call_one(http, limiter, &url, instrument).await;
        results.push((endpoint.clone(), outcome));
    }
    results
}

async fn call_one(http: &reqwest::Client, limiter: &RateLimiter, url: &str, instrument: &str) -> Result<(), CoreError> {
    limiter.acquire().await;

    let resp = http
        .post(url)
        .timeout(REQUEST_TIMEOUT)
        .json(&serde_json::json!({"instruments": [instrument]}))
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CoreError::ExchangeApi(format!("collector {url} returned HTTP {status}: {body}")));
    }
    Ok(())
}
