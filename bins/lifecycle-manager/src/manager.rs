//! Core diff-and-apply cycle.
//!
//! Grounded in `lifecycle_manager.py`'s `_sync_instruments` (fetch active,
//! fetch tracked, set-diff both ways, handle each side, touch last_seen),
//! generalized from asyncpg to the pooled `bb8` client in `deribit-storage`.

use crate::config::ManagerConfig;
use crate::rpc;
use chrono::{Duration as ChronoDuration, Utc};
use deribit_catalog::CatalogClient;
use deribit_core::{CoreError, Instrument, InstrumentKind, LifecycleEvent, LifecycleEventKind, RateLimiter};
use deribit_storage::{instrument_dao, lifecycle_dao, PgPool};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SOFT_CYCLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct LifecycleManager {
    pool: PgPool,
    http: reqwest::Client,
    catalog: CatalogClient,
    limiter: RateLimiter,
    config: Arc<ManagerConfig>,
}

impl LifecycleManager {
    pub async fn new(config: ManagerConfig) -> Result<Self, CoreError> {
        let pool = deribit_storage::connect_pool(&config.database_url).await?;
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            pool,
            http,
            catalog: CatalogClient::new()?,
            limiter: RateLimiter::default(),
            config: Arc::new(config),
        })
    }

    /// Daemon mode: runs forever on `config.refresh_interval`, logging (not
    /// killing) a cycle that exceeds the soft 300s timeout.
    pub async fn run(&self) -> Result<(), CoreError> {
        info!(
            currency = %self.config.currency,
            collectors = self.config.collector_endpoints.len(),
            refresh_interval_secs = self.config.refresh_interval.as_secs(),
            "lifecycle manager starting"
        );

        loop {
            match tokio::time::timeout(SOFT_CYCLE_TIMEOUT, self.run_cycle()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(%err, "refresh cycle failed"),
                Err(_) => warn!(timeout_secs = SOFT_CYCLE_TIMEOUT.as_secs(), "refresh cycle exceeded soft timeout, continuing"),
            }
            tokio::time::sleep(self.config.refresh_interval).await;
        }
    }

    /// `--once` mode: a single cycle, no loop.
    pub async fn run_once(&self) -> Result<(), CoreError> {
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> Result<(), CoreError> {
        let active = self.fetch_active_excluding_near_expiry().await?;
        let tracked = instrument_dao::tracked_active(&self.pool, self.config.currency).await?;

        let (expired, listed) = diff(&active, &tracked);

        info!(active = active.len(), tracked = tracked.len(), expired = expired.len(), listed = listed.len(), "cycle diff computed");

        for instrument in &expired {
            self.handle_expired(instrument).await;
        }
        for instrument in &listed {
            self.handle_listed(instrument).await;
        }

        let active_names: Vec<String> = active.iter().map(|i| i.name.clone()).collect();
        instrument_dao::touch_last_seen(&self.pool, &active_names).await?;

        Ok(())
    }

    /// Deribit's `get_instruments` response includes everything still
    /// technically active; an instrument inside the expiry buffer is
    /// excluded here rather than treated as a member of the active set
    /// (`original_source/scripts/lifecycle_manager.py`'s
    /// `_fetch_active_instruments` does the same exclusion before diffing).
    async fn fetch_active_excluding_near_expiry(&self) -> Result<Vec<Instrument>, CoreError> {
        let all_active = self
            .catalog
            .list_instruments(self.config.currency, InstrumentKind::Option, false)
            .await?;

        let buffer = ChronoDuration::minutes(self.config.expiry_buffer_minutes);
        let cutoff = Utc::now() + buffer;

        Ok(all_active
            .into_iter()
            .filter(|i| !matches!(i.expiry, Some(expiry) if expiry <= cutoff))
            .collect())
    }

    async fn handle_expired(&self, instrument: &str) {
        if let Err(err) = instrument_dao::mark_expired(&self.pool, instrument).await {
            error!(%err, instrument, "failed to mark instrument expired in database");
        }

        let results =
            rpc::fan_out_unsubscribe(&self.http, &self.limiter, &self.config.collector_endpoints, instrument).await;
        for (endpoint, outcome) in &results {
            self.log_event(
                instrument,
                if outcome.is_ok() { LifecycleEventKind::UnsubscribeOk } else { LifecycleEventKind::UnsubscribeFail },
                outcome.is_ok(),
                Some(endpoint.clone()),
                outcome.as_ref().err().map(|e| e.to_string()),
            )
            .await;
        }

        self.log_event(instrument, LifecycleEventKind::Expired, true, None, None).await;
        info!(instrument, "handled expired instrument");
    }

    async fn handle_listed(&self, instrument: &Instrument) {
        if let Err(err) = instrument_dao::insert_listed(&self.pool, instrument).await {
            error!(%err, instrument = %instrument.name, "failed to insert newly listed instrument");
        }

        let results = rpc::fan_out_subscribe(
            &self.http,
            &self.limiter,
            &self.config.collector_endpoints,
            &instrument.name,
        )
        .await;
        for (endpoint, outcome) in &results {
            self.log_event(
                &instrument.name,
                if outcome.is_ok() { LifecycleEventKind::SubscribeOk } else { LifecycleEventKind::SubscribeFail },
                outcome.is_ok(),
                Some(endpoint.clone()),
                outcome.as_ref().err().map(|e| e.to_string()),
            )
            .await;
        }

        self.log_event(&instrument.name, LifecycleEventKind::Listed, true, None, None).await;
        info!(instrument = %instrument.name, "handled newly listed instrument");
    }

    async fn log_event(
        &self,
        instrument: &str,
        kind: LifecycleEventKind,
        success: bool,
        collector_id: Option<String>,
        error: Option<String>,
    ) {
        let event = LifecycleEvent {
            event_time: Utc::now(),
            kind,
            instrument: instrument.to_string(),
            currency: self.config.currency,
            collector_id,
            success,
            error,
            details: None,
        };
        if let Err(err) = lifecycle_dao::log_event(&self.pool, &event).await {
            error!(%err, instrument, "failed to write lifecycle event");
        }
    }
}

/// Set-diffs the venue's active instruments against what's already tracked:
/// anything tracked but no longer active has expired, anything active but
/// not yet tracked is newly listed. Pure and DB/HTTP-free so the diff logic
/// is testable without a cycle's I/O.
fn diff<'a>(active: &'a [Instrument], tracked: &HashSet<String>) -> (Vec<String>, Vec<&'a Instrument>) {
    let active_names: HashSet<&str> = active.iter().map(|i| i.name.as_str()).collect();
    let expired: Vec<String> = tracked.iter().filter(|name| !active_names.contains(name.as_str())).cloned().collect();
    let listed: Vec<&Instrument> = active.iter().filter(|i| !tracked.contains(&i.name)).collect();
    (expired, listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deribit_core::Currency;

    fn instrument(name: &str) -> Instrument {
        Instrument::new(name, Currency::Btc, InstrumentKind::Option)
    }

    #[test]
    fn diff_reports_expired_and_newly_listed() {
        let active = vec![instrument("BTC-1JAN26-50000-C"), instrument("BTC-2JAN26-50000-C")];
        let tracked: HashSet<String> =
            ["BTC-2JAN26-50000-C".to_string(), "BTC-OLD-EXPIRED-C".to_string()].into_iter().collect();

        let (expired, listed) = diff(&active, &tracked);

        assert_eq!(expired, vec!["BTC-OLD-EXPIRED-C".to_string()]);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "BTC-1JAN26-50000-C");
    }

    #[test]
    fn diff_is_empty_when_active_matches_tracked_exactly() {
        let active = vec![instrument("BTC-1JAN26-50000-C")];
        let tracked: HashSet<String> = ["BTC-1JAN26-50000-C".to_string()].into_iter().collect();

        let (expired, listed) = diff(&active, &tracked);

        assert!(expired.is_empty());
        assert!(listed.is_empty());
    }

    #[test]
    fn diff_treats_empty_tracked_set_as_all_newly_listed() {
        let active = vec![instrument("BTC-1JAN26-50000-C"), instrument("BTC-2JAN26-50000-C")];
        let tracked = HashSet::new();

        let (expired, listed) = diff(&active, &tracked);

        assert!(expired.is_empty());
        assert_eq!(listed.len(), 2);
    }
}
