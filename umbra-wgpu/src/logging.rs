//! `log` backend setup.

/// Install `env_logger` as the `log` backend. Honours `RUST_LOG`.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
