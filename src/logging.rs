//! Subscriber setup for the binary.
//!
//! Events fan in from every task to two sinks: stdout, and a non-blocking
//! file writer under `<session>/logs/ingest.log` whose single dispatcher
//! thread does the disk I/O. The monitor's `CPU:`/`MEMORY:`/... lines land
//! in that file for later analysis, so file records open with a bracketed
//! ISO-8601 local timestamp:
//!
//! ```text
//! [2026-03-02T14:07:11.208551]  INFO ingest_orchestrator::supervisor::monitor: CPU: (12.5, 8)
//! ```

// Standard library imports
use std::fs;
use std::path::Path;

// External crate imports
use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// Internal module imports
use crate::error::{IngestError, IngestResult};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "ingest.log";
pub const DEFAULT_FILTER: &str = "info";

/// Local time as `[%Y-%m-%dT%H:%M:%S%.6f]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketedTime;

impl FormatTime for BracketedTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}

/// Build the filter from an explicit directive, `RUST_LOG`, or the default.
pub fn filter(directive: Option<&str>) -> IngestResult<EnvFilter> {
    match directive {
        Some(d) => EnvFilter::try_new(d)
            .map_err(|e| IngestError::validation("log-level", e.to_string(), d)),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber.
///
/// With a session directory, records are also written to
/// `<session_dir>/logs/ingest.log`. Keep the returned guard alive until
/// exit so buffered records are flushed.
pub fn init(directive: Option<&str>, session_dir: Option<&Path>) -> IngestResult<Option<WorkerGuard>> {
    let (file_layer, guard) = match session_dir {
        Some(dir) => {
            let log_dir = dir.join(LOG_DIR);
            fs::create_dir_all(&log_dir)
                .map_err(|e| IngestError::io("create log directory", &log_dir, e))?;
            let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(BracketedTime)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter(directive)?)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| IngestError::config("logging", e.to_string()))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    #[test]
    fn test_file_timestamp_is_bracketed_iso() {
        let mut line = String::new();
        BracketedTime.format_time(&mut Writer::new(&mut line)).unwrap();
        line.push_str(" INFO monitor: CPU: (3.5, 4)");

        assert!(line.starts_with('['));
        let stamp = line.split(']').next().unwrap().trim_start_matches('[');
        assert!(NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok(), "{stamp}");
        assert_eq!(line.split("CPU:").nth(1).map(str::trim), Some("(3.5, 4)"));
    }

    #[test]
    fn test_filter_directives() {
        assert!(filter(Some("debug,ingest_orchestrator=trace")).is_ok());
        assert!(filter(Some("ingest_orchestrator=verbose")).is_err());
        assert!(filter(None).is_ok());
    }
}
