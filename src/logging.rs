use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIRECTORY: &str = "logs";
const LOG_FILE: &str = "esb_gateway.log";

/// Initializes logging with a daily-rotated JSON file and a console layer.
///
/// `RUST_LOG` directives take precedence; `esb_gateway=info` is always added.
pub fn init_logging() -> anyhow::Result<()> {
    fs::create_dir_all(LOG_DIRECTORY)?;

    let file_appender = tracing_appender::rolling::daily(LOG_DIRECTORY, LOG_FILE);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("esb_gateway=info".parse()?))
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    // The guard flushes on drop; the process owns it until exit.
    std::mem::forget(guard);
    Ok(())
}
