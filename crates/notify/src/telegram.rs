use async_trait::async_trait;
use kassa_core::SyncReport;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

use crate::format::{format_report, split_message, MAX_MESSAGE_LEN};
use crate::{Notifier, NotifyError};

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    /// User id or (negative) group id; TOML may carry either form.
    #[serde(deserialize_with = "chat_id")]
    pub chat_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    TELEGRAM_API_URL.to_string()
}

fn chat_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Int(n) => n.to_string(),
        Raw::Str(s) => s.trim().to_string(),
    })
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"***")
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Posts the report to a chat through the Bot API, split into as many
/// messages as needed.
pub struct TelegramNotifier {
    config: TelegramConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        if config.token.trim().is_empty() {
            return Err(NotifyError::Config("Telegram token is missing".into()));
        }
        if config.chat_id.is_empty() {
            return Err(NotifyError::Config("Telegram chat_id is missing".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        tracing::info!(chat_id = %config.chat_id, "Telegram notifier initialized");
        Ok(Self { config, http })
    }

    async fn send_chunk(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.base_url.trim_end_matches('/'),
            self.config.token
        );
        let resp = self
            .http
            .post(url)
            .json(&SendMessage {
                chat_id: &self.config.chat_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        check_response(status.as_u16(), &body)
    }
}

fn check_response(status: u16, body: &str) -> Result<(), NotifyError> {
    match serde_json::from_str::<ApiResponse>(body) {
        Ok(r) if r.ok => Ok(()),
        Ok(r) => Err(NotifyError::Rejected(
            r.description.unwrap_or_else(|| format!("status {status}")),
        )),
        Err(_) => Err(NotifyError::Status {
            status,
            body: body.chars().take(500).collect(),
        }),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, report: &SyncReport) -> Result<(), NotifyError> {
        let text = format_report(report);
        let chunks = split_message(&text, MAX_MESSAGE_LEN);
        if chunks.len() > 1 {
            tracing::info!(
                len = text.chars().count(),
                parts = chunks.len(),
                "Report exceeds message limit, splitting"
            );
        }

        tracing::info!(chat_id = %self.config.chat_id, parts = chunks.len(), "Sending Telegram notification");
        for (i, chunk) in chunks.iter().enumerate() {
            tracing::debug!(part = i + 1, len = chunk.chars().count(), "Sending part");
            self.send_chunk(chunk).await?;
        }
        tracing::info!("Telegram notification sent");
        Ok(())
    }
}
