use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console output plus a daily-rotated JSON log under `log_dir`.
///
/// Pipeline events carry `batch_id`, `run_id` and `table` fields, so the JSON
/// file can be filtered per batch.
pub fn init_logging(log_dir: &str) {
    let _ = fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "medallion_etl.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    // Respect RUST_LOG if set; otherwise info for our crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("medallion_etl=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // Keep the writer guard alive for the whole process so logs flush on exit
    std::mem::forget(guard);
}
