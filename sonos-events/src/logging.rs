//! Logging setup for applications embedding an event session.
//!
//! Library code only emits `tracing` events. Nothing is printed until the
//! application installs a subscriber, either its own or one of the presets
//! here.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at info level
    Development,
    /// Verbose output with threads and source locations at debug level
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install a global subscriber for `mode`.
///
/// # Environment Variables
///
/// - `SONOS_EVENTS_LOG_LEVEL`: filter directive overriding the mode's level
///   (e.g. `debug`, `sonos_events=trace,callback_server=info`)
/// - `RUST_LOG`: used when `SONOS_EVENTS_LOG_LEVEL` is unset
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .with(env_filter("info"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(env_filter("debug"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
    }
}

/// Initialize logging from `SONOS_EVENTS_LOG_MODE`.
///
/// `development` and `debug` select the matching preset; anything else,
/// including an unset variable, is [`LoggingMode::Silent`].
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = parse_mode(std::env::var("SONOS_EVENTS_LOG_MODE").ok().as_deref());
    init_logging(mode)
}

fn parse_mode(value: Option<&str>) -> LoggingMode {
    match value.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("development") => LoggingMode::Development,
        Some(v) if v.eq_ignore_ascii_case("debug") => LoggingMode::Debug,
        _ => LoggingMode::Silent,
    }
}

// SONOS_EVENTS_LOG_LEVEL, then RUST_LOG, then the mode's default
fn env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("SONOS_EVENTS_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Whether a global subscriber has been installed.
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(Some("development")), LoggingMode::Development);
        assert_eq!(parse_mode(Some("DEBUG")), LoggingMode::Debug);
        assert_eq!(parse_mode(Some("verbose")), LoggingMode::Silent);
        assert_eq!(parse_mode(None), LoggingMode::Silent);
    }
}
