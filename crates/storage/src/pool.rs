use bb8_postgres::PostgresConnectionManager;
use deribit_core::CoreError;
use tokio_postgres::NoTls;

/// Shared pool type: every writer and DAO in this crate takes a `&PgPool`
/// rather than owning a connection, so write concurrency is bounded by the
/// pool size rather than by however many tasks happen to be running.
pub type PgPool = bb8::Pool<PostgresConnectionManager<NoTls>>;

/// Builds a small 2-5 connection pool, fixed rather than exposing a
/// configurable range no caller in this fleet actually varies.
pub async fn connect_pool(database_url: &str) -> Result<PgPool, CoreError> {
    let config: tokio_postgres::Config = database_url.parse().map_err(|e: tokio_postgres::Error| {
        CoreError::InvalidEnv {
            name: "DATABASE_URL",
            value: "<redacted>".to_string(),
            reason: e.to_string(),
        }
    })?;
    let manager = PostgresConnectionManager::new(config, NoTls);
    let pool = bb8::Pool::builder()
        .min_idle(Some(2))
        .max_size(5)
        .build(manager)
        .await?;
    Ok(pool)
}
