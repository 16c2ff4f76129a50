//! Unified logging system
//!
//! Structured logging for the session layer and the CLI, configurable from the
//! `[logging]` table of the config file.

use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{ErrorContext, RxdeskError, RxdeskResult};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to include thread information
    pub include_thread: bool,
    /// Whether to log span close events with their timings
    pub log_span_timings: bool,
    /// Log file path; stderr when unset
    pub log_file_path: Option<String>,
    /// Custom filter directives
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            log_span_timings: false,
            log_file_path: None,
            filter_directives: vec![
                "rxdesk_core=info".to_string(),
                "rxdesk_session=info".to_string(),
            ],
        }
    }
}

/// Initialize the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> RxdeskResult<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for directive in &config.filter_directives {
        let parsed = directive.parse().map_err(|e| RxdeskError::Logging {
            message: format!("Invalid filter directive '{}': {}", directive, e),
            context: ErrorContext::new("logging")
                .with_operation("parse_directive")
                .with_suggestion("Use directives like 'rxdesk_session=debug'"),
        })?;
        filter = filter.add_directive(parsed);
    }

    let span_events = if config.log_span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread);

    let registry = tracing_subscriber::registry().with(filter);

    let result = match (&config.log_file_path, config.format) {
        (Some(path), format) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let writer = std::sync::Mutex::new(file);
            match format {
                LogFormat::Json => registry.with(base.json().with_writer(writer)).try_init(),
                LogFormat::Pretty => registry.with(base.pretty().with_writer(writer)).try_init(),
                LogFormat::Compact => {
                    registry.with(base.compact().with_writer(writer)).try_init()
                }
            }
        }
        (None, LogFormat::Json) => registry.with(base.json().with_writer(io::stderr)).try_init(),
        (None, LogFormat::Pretty) => registry
            .with(base.pretty().with_writer(io::stderr))
            .try_init(),
        (None, LogFormat::Compact) => registry
            .with(base.compact().with_writer(io::stderr))
            .try_init(),
    };

    result.map_err(|e| RxdeskError::Logging {
        message: format!("Failed to install subscriber: {}", e),
        context: ErrorContext::new("logging").with_operation("init"),
    })
}

/// Logging macros for common patterns
#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr) => {
        tracing::info!(
            operation = $operation,
            "Starting operation"
        );
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info!(
            operation = $operation,
            $($field)*,
            "Starting operation"
        );
    };
}

#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr) => {
        tracing::info!(
            operation = $operation,
            "Operation completed successfully"
        );
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info!(
            operation = $operation,
            $($field)*,
            "Operation completed successfully"
        );
    };
}

#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "Operation failed"
        );
    };
    ($operation:expr, $error:expr, $($field:tt)*) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            $($field)*,
            "Operation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_partial_toml() {
        let config: LoggingConfig = toml::from_str("level = \"debug\"\nformat = \"json\"").unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.log_file_path.is_none());
        assert_eq!(config.filter_directives.len(), 2);
    }

    #[test]
    fn test_invalid_directive_is_rejected() {
        let config = LoggingConfig {
            filter_directives: vec!["rxdesk_session=verbose".to_string()],
            ..Default::default()
        };
        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, RxdeskError::Logging { .. }));
    }
}
