use cfo_core::config::{GeneralConfig, LogFormat};
use cfo_telemetry::logging;

#[test]
fn init_logging_twice_is_a_noop() {
    logging::init_logging("cfo-test", "debug");
    logging::init_logging("cfo-test", "info");

    tracing::info!(entity_id = "client_x", "human-readable log line");
}

#[test]
fn init_logging_json_after_global_set() {
    // The first test to run owns the global subscriber; this must not panic.
    logging::init_logging_json("cfo-test-json", "info");

    tracing::info!(action_id = "a-1", "json log line");
}

#[test]
fn init_from_config_accepts_both_formats() {
    let mut general = GeneralConfig::default();
    logging::init_from_config(&general.service_name, &general);

    general.log_format = LogFormat::Json;
    general.log_level = "cfo_agents=debug,warn".into();
    logging::init_from_config("cfo-cli", &general);
}
