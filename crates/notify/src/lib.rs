pub mod format;
pub mod telegram;

pub use format::{format_report, split_message, MAX_MESSAGE_LEN};
pub use telegram::{TelegramConfig, TelegramNotifier};

use async_trait::async_trait;
use kassa_core::SyncReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Telegram returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Telegram rejected message: {0}")]
    Rejected(String),
    #[error("Invalid notifier configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        // The bot token is part of the request path.
        NotifyError::Http(e.without_url())
    }
}

/// Delivers a finished [`SyncReport`] to its audience.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, report: &SyncReport) -> Result<(), NotifyError>;
}

/// Writes the rendered report to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, report: &SyncReport) -> Result<(), NotifyError> {
        let text = format_report(report);
        if report.has_discrepancies() {
            tracing::warn!("Sync report:\n{text}");
        } else {
            tracing::info!("Sync report:\n{text}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let report = SyncReport::failed("N/A", "N/A", "config missing");
        assert!(LogNotifier.send(&report).await.is_ok());
    }

    #[test]
    fn notify_error_display() {
        let err = NotifyError::Rejected("Bad Request: chat not found".into());
        assert_eq!(
            err.to_string(),
            "Telegram rejected message: Bad Request: chat not found"
        );
    }
}
