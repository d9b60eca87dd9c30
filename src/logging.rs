//! Development-time tracing for debugging the runner.
//!
//! Dev diagnostics go to stderr via `RUST_LOG` (compact format); product
//! progress is rendered separately by the `ui` event sink. An optional
//! JSON file layer captures a machine-readable trail for escalations.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive for the process lifetime
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `initguard=debug` with `--debug`,
/// `initguard=warn` otherwise.
pub fn init(debug: bool, log_file: Option<&Path>) -> LogGuard {
    let default_filter = if debug {
        "initguard=debug"
    } else {
        "initguard=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).compact();

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "initguard.log".to_string());
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| Path::new(".")),
                file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().json().with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            LogGuard {
                _file_guard: Some(guard),
            }
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();

            LogGuard { _file_guard: None }
        }
    }
}
