//! Logging initialization and configuration.
//!
//! Standard output carries the replay's JSON event lines, so logs never go
//! there:
//! - **Production**: JSON logs to rolling files + compact logs to stderr
//! - **Development**: Pretty logs to stderr with span events

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "LOCWATCH_LOG_LEVEL";

/// Static guards to keep non-blocking writers alive.
/// These must persist for the lifetime of the program.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDERR_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the logging system.
///
/// # Arguments
///
/// * `is_production` - Whether to use production logging configuration
///
/// # Production Mode
///
/// - Logs to rolling daily files under the platform data directory
/// - JSON format for structured logging in files
/// - Compact format for stderr (no ANSI colors)
///
/// # Development Mode
///
/// - Logs to stderr only with pretty formatting
/// - Includes span events for debugging
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    if is_production {
        init_production(env_filter);
    } else {
        init_development(env_filter);
    }

    Ok(())
}

/// Initialize production logging with file + stderr output.
fn init_production(env_filter: EnvFilter) {
    let log_dir = log_directory();

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir).ok();
    }

    // Rolling file appender - creates new file daily
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "locwatch-replay");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stderr)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDERR_GUARD.set(stderr_guard);
}

/// Initialize development logging with pretty stderr output.
fn init_development(env_filter: EnvFilter) {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

/// Directory production logs are written to.
fn log_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", "locwatch")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        let dir = log_directory();
        assert!(!dir.as_os_str().is_empty());
        assert!(dir.ends_with("logs"));
    }
}
