//! Structured logging
//!
//! Warnings and errors go to the terminal; everything at the configured
//! level goes to an optional daily rolling log file in JSON or line format.

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, time::UtcTime, MakeWriter},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

use crate::config_loader::Logging;

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

const LOG_FILE_NAME: &str = "subreddit_image_grabber.log";

/// Terminal layer. Only warnings and errors pass so prompts and the
/// progress bar are not interleaved with status logs.
fn terminal_layer<S, W>(make_writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(make_writer)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(LevelFilter::WARN)
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output gets flushed.
pub fn init_logger(logging: &Logging, log_dir: &Path) -> LoggerResult<Option<WorkerGuard>> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.log_level))
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    let (file_layer, guard) = if logging.log_to_file {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = match logging.log_format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(filter)
                .boxed(),
            _ => fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(filter)
                .boxed(),
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(terminal_layer(io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    info!(
        log_format = %logging.log_format,
        log_level = %logging.log_level,
        log_to_file = logging.log_to_file,
        "Logger initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing::{error, warn};

    /// Collects everything the terminal layer writes.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn test_terminal_shows_only_warnings_and_errors() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber =
            tracing_subscriber::registry().with(terminal_layer(move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            info!("Saved image: meme_1234.jpg");
            warn!("Failed to open image");
            error!("Failed to download image");
        });

        let output = captured.text();
        assert!(!output.contains("Saved image"));
        assert!(output.contains("Failed to open image"));
        assert!(output.contains("Failed to download image"));
    }
}
