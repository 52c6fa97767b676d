//! Lifecycle manager configuration.
//!
//! Grounded in `lifecycle_manager.py`'s `LifecycleManager.__init__`
//! (database_url, currency, collector_endpoints, refresh_interval_sec=300,
//! expiry_buffer_minutes=5) and the original codebase's `AppConfig::from_env` style.

use deribit_core::{env, CoreError, Currency};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub database_url: String,
    pub currency: Currency,
    pub collector_endpoints: Vec<String>,
    pub refresh_interval: Duration,
    pub expiry_buffer_minutes: i64,
}

impl ManagerConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        let currency_raw = env::env_required("CURRENCY")?;
        let currency = currency_raw.parse::<Currency>().map_err(|reason| CoreError::InvalidEnv {
            name: "CURRENCY",
            value: currency_raw,
            reason,
        })?;

        let collector_endpoints = env::env_list("COLLECTOR_ENDPOINTS");
        for endpoint in &collector_endpoints {
            url::Url::parse(endpoint).map_err(|e| CoreError::InvalidEnv {
                name: "COLLECTOR_ENDPOINTS",
                value: endpoint.clone(),
                reason: e.to_string(),
            })?;
        }
        if collector_endpoints.is_empty() {
            tracing::warn!("COLLECTOR_ENDPOINTS is empty: lifecycle events will be logged but never fanned out");
        }

        Ok(Self {
            database_url: env::env_required("DATABASE_URL")?,
            currency,
            collector_endpoints,
            refresh_interval: Duration::from_secs(env::env_parsed("LIFECYCLE_REFRESH_INTERVAL_SEC", 300)?),
            expiry_buffer_minutes: env::env_parsed("LIFECYCLE_EXPIRY_BUFFER_MINUTES", 5)?,
        })
    }
}
