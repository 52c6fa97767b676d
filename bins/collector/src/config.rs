//! Collector process configuration, loaded entirely from the environment.
//!
//! Grounded in the original codebase's `core::config::AppConfig::from_env` (plain
//! struct, `std::env::var` with defaults, one `MissingEnv` error for
//! required values).

use deribit_core::{env, CoreError, Currency};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub ws_url: String,
    pub database_url: String,
    pub currency: Currency,
    pub connection_id: usize,
    pub top_n_instruments: usize,
    pub buffer_quotes: usize,
    pub buffer_trades: usize,
    pub buffer_depth: usize,
    pub flush_interval: Duration,
    pub snapshot_interval: Duration,
    pub instrument_refresh_interval: Duration,
    pub control_api_port_base: u16,
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        let currency_raw = env::env_required("CURRENCY")?;
        let currency = currency_raw.parse::<Currency>().map_err(|reason| CoreError::InvalidEnv {
            name: "CURRENCY",
            value: currency_raw,
            reason,
        })?;

        Ok(Self {
            ws_url: env::env_string("DERIBIT_WS_URL", "wss://www.deribit.com/ws/api/v2"),
            database_url: env::env_required("DATABASE_URL")?,
            currency,
            connection_id: env::env_parsed("CONNECTION_ID", 0)?,
            top_n_instruments: env::env_parsed("TOP_N_INSTRUMENTS", 250)?,
            buffer_quotes: env::env_parsed("BUFFER_SIZE_QUOTES", 200_000)?,
            buffer_trades: env::env_parsed("BUFFER_SIZE_TRADES", 100_000)?,
            buffer_depth: env::env_parsed("BUFFER_SIZE_DEPTH", 50_000)?,
            flush_interval: Duration::from_secs(env::env_parsed("FLUSH_INTERVAL_SEC", 3)?),
            snapshot_interval: Duration::from_secs(env::env_parsed("SNAPSHOT_INTERVAL_SEC", 300)?),
            instrument_refresh_interval: Duration::from_secs(
                env::env_parsed("INSTRUMENT_REFRESH_INTERVAL_SEC", 3600)?,
            ),
            control_api_port_base: env::env_parsed("CONTROL_API_PORT", 8000)?,
        })
    }

    /// Each connection within a currency's fleet gets its own control API
    /// port, offset by `connection_id`, so a process manager can address
    /// them individually.
    pub fn control_api_port(&self) -> u16 {
        self.control_api_port_base + self.connection_id as u16
    }
}
