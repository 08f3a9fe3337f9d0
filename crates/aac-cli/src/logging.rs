//! Startup logging configuration.
//!
//! Library crates emit through the plain `log` facade without a structured
//! key-value logger, so fields like `run_id`/`stage_name`/`attempt` are
//! interpolated into the message text rather than attached as structured
//! fields. `aac-cli` is the only binary that installs a logger.

pub fn configure_logging(level: &str) {
    env_logger::Builder::new().parse_filters(level).format_timestamp_millis().init();
}
