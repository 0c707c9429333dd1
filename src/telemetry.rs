//! Logging setup: console output plus an optional daily-rolling log file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE: &str = "pipeline.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. With `log_dir`, a plain-text copy of every
/// event also goes to `<log_dir>/pipeline.log.<date>`; keep the returned guard
/// alive until exit or buffered lines are lost.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console = fmt::layer().with_target(false);

    let (writer, guard) = log_dir
        .and_then(|dir| match std::fs::create_dir_all(dir) {
            Ok(()) => Some(tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE))),
            Err(e) => {
                eprintln!("Could not create log directory {}: {}", dir.display(), e);
                None
            }
        })
        .unzip();
    let file_layer = writer.map(|w| fmt::layer().with_ansi(false).with_writer(w));

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter())
        .with(console)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Tracing already initialized: {}", e);
    }

    guard
}
