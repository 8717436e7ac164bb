use cfo_core::config::{GeneralConfig, LogFormat};
use tracing_subscriber::{fmt, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging with human-readable output on stderr.
///
/// `RUST_LOG` wins over `default_level` (e.g. "info", "cfo_agents=debug,warn").
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    fmt()
        .with_env_filter(filter(default_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (human-readable)");
}

/// Initialize logging as JSON lines, one object per event.
///
/// Same `RUST_LOG` precedence and idempotence as [`init_logging`].
pub fn init_logging_json(service_name: &str, default_level: &str) {
    fmt()
        .json()
        .with_env_filter(filter(default_level))
        .with_target(true)
        .with_current_span(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}

/// Pick the output format and level from the `[general]` config section.
pub fn init_from_config(service_name: &str, general: &GeneralConfig) {
    match general.log_format {
        LogFormat::Pretty => init_logging(service_name, &general.log_level),
        LogFormat::Json => init_logging_json(service_name, &general.log_level),
    }
}
