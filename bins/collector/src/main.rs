mod api;
mod config;
mod context;
mod flush;
mod heartbeat;
mod refresh;
mod snapshot_task;
mod ws;

use config::CollectorConfig;
use context::{CollectorContext, CollectorStats};
use deribit_buffer::{BufferCapacities, TickBuffer};
use deribit_catalog::CatalogClient;
use deribit_core::{CoreError, InstrumentKind};
use deribit_snapshot::SnapshotFetcher;
use deribit_storage::{BatchWriter, InstrumentClass, TableScope};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    deribit_core::logging::init_tracing("deribit_collector=info,deribit_core=info");

    let config = match CollectorConfig::from_env() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        error!(%err, "collector exited with error");
        std::process::exit(1);
    }
}

async fn run(config: CollectorConfig) -> Result<(), CoreError> {
    info!(currency = %config.currency, connection_id = config.connection_id, "starting collector");

    let catalog = Arc::new(CatalogClient::new()?);
    let all_instruments = catalog
        .list_instruments(config.currency, InstrumentKind::Option, false)
        .await?;
    let names: Vec<String> = all_instruments.into_iter().map(|i| i.name).collect();

    let owned_partition = deribit_partition::partition_for_connection(
        &names,
        config.top_n_instruments,
        config.connection_id,
    )
    .map_err(|_| CoreError::PartitionOutOfRange {
        connection_id: config.connection_id,
        partitions: names.len().div_ceil(config.top_n_instruments.max(1)),
    })?;

    info!(instruments = owned_partition.len(), "assigned partition");

    let scope = TableScope::new(config.currency, InstrumentClass::Option);
    let writer = Arc::new(BatchWriter::connect(&config.database_url, scope).await?);

    let buffer = Arc::new(TickBuffer::new(BufferCapacities {
        quotes: config.buffer_quotes,
        trades: config.buffer_trades,
        depth: config.buffer_depth,
    }));

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;
    let snapshot = Arc::new(SnapshotFetcher::new(http));

    let ctx = CollectorContext {
        config: Arc::new(config),
        writer,
        buffer,
        catalog,
        snapshot,
        owned: Arc::new(RwLock::new(owned_partition.into_iter().collect())),
        generation: Arc::new(AtomicU64::new(0)),
        last_tick: Arc::new(StdMutex::new(None)),
        stats: Arc::new(CollectorStats::default()),
        cancel: CancellationToken::new(),
        ws_commands: Arc::new(AsyncMutex::new(None)),
        pending_acks: Arc::new(StdMutex::new(HashMap::new())),
        request_id: Arc::new(AtomicU64::new(1)),
    };

    info!("seeding initial full-depth snapshot");
    if let Err(err) = snapshot_task::run_once(&ctx, true).await {
        error!(%err, "initial snapshot failed, continuing with live ticks only");
    }

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(ws::run(ctx.clone())));
    tasks.push(tokio::spawn(flush::run(ctx.clone())));
    tasks.push(tokio::spawn(heartbeat::run(ctx.clone())));
    tasks.push(tokio::spawn(snapshot_task::run_periodic(ctx.clone())));
    tasks.push(tokio::spawn(refresh::run(ctx.clone())));

    let port = ctx.config.control_api_port();
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();
    let app = api::router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| CoreError::Config(e.to_string()))?;
    info!(%addr, "control API listening");

    // The control API must be the last thing to stop: ctrl_c cancels the
    // five background tasks and waits for them (plus a final flush) before
    // signalling axum's own shutdown, rather than racing both off one token.
    let control_api_shutdown = CancellationToken::new();
    let shutdown_ctx = ctx.clone();
    let shutdown_signal = control_api_shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, stopping background tasks");
        shutdown_ctx.cancel.cancel();
        for task in tasks {
            let _ = task.await;
        }

        info!("performing final buffer flush before exit");
        if let Err(err) = flush::flush_once(&shutdown_ctx).await {
            error!(%err, "final flush failed");
        }

        shutdown_signal.cancel();
    });

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            control_api_shutdown.cancelled().await;
        })
        .await;

    if let Err(err) = serve_result {
        error!(%err, "control API server error");
    }

    Ok(())
}
