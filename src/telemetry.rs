use std::path::Path;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use crate::config::{AppConfig, LogFormat};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "app.log";

/// Install the global subscriber. `RUST_LOG` overrides `LOG_LEVEL`.
/// In production events go to `logs/app.log`; keep the returned guard alive
/// until shutdown so buffered lines are flushed.
pub fn init(cfg: &AppConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&cfg.log_level)));

    let mut file_error = None;
    let (writer, guard) = if cfg.is_production() {
        match open_log_file(Path::new(LOG_DIR)) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (BoxMakeWriter::new(writer), Some(guard))
            }
            Err(e) => {
                file_error = Some(e);
                (BoxMakeWriter::new(std::io::stdout), None)
            }
        }
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    match cfg.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(writer)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .init(),
    }

    if let Some(e) = file_error {
        tracing::warn!(error = %e, "failed to open log file, using stdout");
    }
    guard
}

fn open_log_file(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE)
        .build(dir)
}

fn default_directives(level: &str) -> String {
    let level = level
        .trim()
        .parse::<tracing::Level>()
        .map(|l| l.to_string().to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    format!("{level},tower_http={level},sqlx=warn")
}
