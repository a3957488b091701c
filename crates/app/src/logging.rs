use std::path::Path;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber: console output, plus `log_file` when
/// given. `RUST_LOG` wins over `default_level`.
///
/// Safe to call twice; the second call is a no-op. A log file that cannot
/// be opened leaves console logging in place and is reported as a warning.
pub fn init(default_level: &str, log_file: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, file_error) = match log_file.map(file_appender) {
        Some(Ok(appender)) => (
            Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(false),
            ),
            None,
        ),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    if let (Some(path), Some(e)) = (log_file, file_error) {
        tracing::warn!(path = %path.display(), "Log file unavailable, logging to console only: {e}");
    }
}

/// Appends to `path`, creating its directory when missing.
pub fn file_appender(path: &Path) -> Result<RollingFileAppender, InitError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("kassa.log");
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn appender_writes_to_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("sync.log");

        let mut appender = file_appender(&path).unwrap();
        appender.write_all(b"sync started\n").unwrap();
        appender.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sync started\n");
    }
}
