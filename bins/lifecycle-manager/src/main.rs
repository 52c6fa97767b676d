mod config;
mod manager;
mod rpc;

use config::ManagerConfig;
use manager::LifecycleManager;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    deribit_core::logging::init_tracing("deribit_lifecycle_manager=info,deribit_core=info");

    let once = std::env::args().any(|arg| arg == "--once");

    let config = match ManagerConfig::from_env() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let manager = match LifecycleManager::new(config).await {
        Ok(m) => m,
        Err(err) => {
            eprintln!("failed to start lifecycle manager: {err}");
            std::process::exit(1);
        }
    };

    let result = if once { manager.run_once().await } else { manager.run().await };

    if let Err(err) = result {
        error!(%err, "lifecycle manager exited with error");
        std::process::exit(1);
    }
}
