//! File logging for the CLI. Stdout is reserved for user-facing output, so
//! diagnostics go to a daily rolling file under `~/.xtab/logs`.

use fs_err as fs;
use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_FILES: usize = 7;

/// Installs the subscriber. The returned guard must live until exit so
/// buffered lines are flushed. Logging failures never stop the CLI.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("xtab-ctl: logging disabled: {}", err);
        return None;
    }

    let appender = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("xtab-ctl")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
    {
        Ok(appender) => appender,
        Err(err) => {
            eprintln!("xtab-ctl: logging disabled: {}", err);
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter())
        .init();

    Some(guard)
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var("XTAB_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
