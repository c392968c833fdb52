use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber, honouring `RUST_LOG`. Repeated
/// calls are no-ops so tests and binaries can both invoke it.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("traplist_backend=info,tower_http=info"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
