use tracing_subscriber::EnvFilter;

/// Initializes the process-wide `tracing` subscriber.
///
/// Every binary calls this once at the top of `main`, following the
/// `RUST_LOG`-driven `EnvFilter` convention the pack's services use rather
/// than a bespoke logging setup per crate.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
