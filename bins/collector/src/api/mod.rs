//! Control API: per-connection axum server a lifecycle manager or operator
//! talks to for live subscribe/unsubscribe and status.
//!
//! Grounded in the original codebase's `api::mod::router` (one `Router<State>`
//! assembled by merging a route-group module).

mod routes;

use crate::context::CollectorContext;
use axum::Router;

pub fn router(ctx: CollectorContext) -> Router {
    Router::new().merge(routes::router()).with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;
    use crate::context::CollectorStats;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use deribit_buffer::{BufferCapacities, TickBuffer};
    use deribit_catalog::CatalogClient;
    use deribit_core::Currency;
    use deribit_snapshot::SnapshotFetcher;
    use deribit_storage::{BatchWriter, InstrumentClass, TableScope};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicU64;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::sync::{Mutex as AsyncMutex, RwLock};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    async fn test_context(database_url: &str) -> CollectorContext {
        let writer = BatchWriter::connect(database_url, TableScope::new(Currency::Btc, InstrumentClass::Option))
            .await
            .expect("connect");

        CollectorContext {
            config: Arc::new(CollectorConfig {
                ws_url: "wss://example.invalid/ws".to_string(),
                database_url: database_url.to_string(),
                currency: Currency::Btc,
                connection_id: 0,
                top_n_instruments: 250,
                buffer_quotes: 10,
                buffer_trades: 10,
                buffer_depth: 10,
                flush_interval: std::time::Duration::from_secs(3),
                snapshot_interval: std::time::Duration::from_secs(300),
                instrument_refresh_interval: std::time::Duration::from_secs(3600),
                control_api_port_base: 8000,
            }),
            writer: Arc::new(writer),
            buffer: Arc::new(TickBuffer::new(BufferCapacities { quotes: 10, trades: 10, depth: 10 })),
            catalog: Arc::new(CatalogClient::new().expect("catalog client")),
            snapshot: Arc::new(SnapshotFetcher::new(reqwest::Client::new())),
            owned: Arc::new(RwLock::new(HashSet::new())),
            generation: Arc::new(AtomicU64::new(0)),
            last_tick: Arc::new(StdMutex::new(None)),
            stats: Arc::new(CollectorStats::default()),
            cancel: CancellationToken::new(),
            ws_commands: Arc::new(AsyncMutex::new(None)),
            pending_acks: Arc::new(StdMutex::new(HashMap::new())),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn subscribe_request() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/subscribe")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"instruments": ["BTC-PERPETUAL"]}"#))
            .unwrap()
    }

    /// Requires a running Postgres with the fleet schema applied, matching
    /// `deribit-storage`'s own live-pool test; run with
    /// `DATABASE_URL=... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn subscribing_the_same_instrument_twice_is_idempotent() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let ctx = test_context(&database_url).await;
        let app = router(ctx.clone());

        let first = app.clone().oneshot(subscribe_request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(subscribe_request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let owned = ctx.owned.read().await;
        assert_eq!(owned.len(), 1);
        assert!(owned.contains("BTC-PERPETUAL"));
    }

    #[tokio::test]
    #[ignore]
    async fn health_check_reports_healthy_without_touching_any_dependency() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let ctx = test_context(&database_url).await;
        let app = router(ctx);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
