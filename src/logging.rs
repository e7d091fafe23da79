//! Subscriber setup: a rolling log file plus coloured stdout, or JSON to the
//! file only.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogConfig;

/// sqlx logs every statement at `info`. The account operations run on every
/// login and balance change, so only its warnings (slow statements) are kept
/// unless the level string names sqlx itself.
const SQLX_DIRECTIVE: &str = "sqlx=warn";

fn rotation(name: &str) -> Rotation {
    match name.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

fn filter_directives(config: &LogConfig) -> String {
    if config.log_level.contains("sqlx") {
        config.log_level.clone()
    } else {
        format!("{},{}", config.log_level, SQLX_DIRECTIVE)
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<WorkerGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation(&config.rotation))
        .filename_prefix(&config.log_file)
        .build(&config.log_dir)
        .with_context(|| format!("Failed to open log directory {}", config.log_dir))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(writer).with_ansi(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false).with_ansi(true))
            .try_init()?;
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_statement_logging_is_quieted() {
        let config = LogConfig::default();
        assert_eq!(filter_directives(&config), "info,sqlx=warn");

        let explicit = LogConfig {
            log_level: "debug,sqlx=info".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(filter_directives(&explicit), "debug,sqlx=info");
    }

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("hourly"), Rotation::HOURLY);
        assert_eq!(rotation("Daily"), Rotation::DAILY);
        assert_eq!(rotation("never"), Rotation::NEVER);
        assert_eq!(rotation("weekly"), Rotation::NEVER);
    }
}
