use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FILE_PREFIX: &str = "processamento";

/// Console plus a daily `processamento.YYYY-MM-DD` file in `log_dir`.
///
/// The returned guard flushes the file writer on drop and must live until shutdown.
/// A second call in the same process keeps the first subscriber.
pub fn init_logging(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    // default to info if RUST_LOG is not set
    let log_spec = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(log_spec))
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    Ok(guard)
}
