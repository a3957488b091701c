use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};
use kassa_core::{Money, NormalizedTransaction, Source, SyncWindow, TransactionId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::de;
use crate::error::{NormalizeError, SourceError};
use crate::http;
use crate::TransactionSource;

pub const POSTER_API_URL: &str = "https://joinposter.com/api";

/// `type` filter for `finance.getTransactions`: expenses.
const EXPENSE_TYPE: &str = "0";

#[derive(Clone, Deserialize)]
pub struct PosterConfig {
    #[serde(default)]
    pub token: String,
    #[serde(deserialize_with = "de::int")]
    pub account_id: i64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Comments containing this (case-insensitive) mark bank fees, which
    /// have no counterpart on the bank side.
    #[serde(default = "default_exclude_keyword")]
    pub exclude_keyword: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    POSTER_API_URL.to_string()
}

fn default_exclude_keyword() -> Option<String> {
    Some("комісія".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

impl fmt::Debug for PosterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosterConfig")
            .field("token", &"***")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("exclude_keyword", &self.exclude_keyword)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Poster POS finance API. Only expenses are kept, minus fee records.
pub struct PosterClient {
    config: PosterConfig,
    http: reqwest::Client,
}

impl PosterClient {
    pub fn new(config: PosterConfig) -> Result<Self, SourceError> {
        if config.token.trim().is_empty() {
            return Err(SourceError::Config {
                feed: Source::Poster,
                message: "token is missing".to_string(),
            });
        }
        let http = http::client(config.timeout_secs)?;
        tracing::info!(account_id = config.account_id, "Poster client initialized");
        Ok(Self { config, http })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}/{method}", self.config.base_url.trim_end_matches('/'));
        tracing::info!(method, "Requesting Poster API");
        let req = self
            .http
            .get(url)
            .query(&[("token", self.config.token.as_str())])
            .query(params);
        let envelope: Envelope<T> = http::send_json(req, Source::Poster).await?;
        envelope.into_result()
    }
}

#[async_trait]
impl TransactionSource for PosterClient {
    fn source(&self) -> Source {
        Source::Poster
    }

    async fn fetch_transactions(
        &self,
        window: &SyncWindow,
    ) -> Result<Vec<NormalizedTransaction>, SourceError> {
        let from = window.start.format("%Y%m%d").to_string();
        let to = window.end.format("%Y%m%d").to_string();
        let account_id = self.config.account_id.to_string();

        let raw: Vec<Value> = self
            .call(
                "finance.getTransactions",
                &[
                    ("dateFrom", from.as_str()),
                    ("dateTo", to.as_str()),
                    ("type", EXPENSE_TYPE),
                    ("account_id", account_id.as_str()),
                ],
            )
            .await?;

        let received = raw.len();
        let filtered = collect_expenses(raw, self.config.exclude_keyword.as_deref());
        if filtered.excluded > 0 {
            tracing::info!(
                excluded = filtered.excluded,
                "Filtered out Poster transactions marked as fees"
            );
        }
        tracing::info!(received, kept = filtered.kept.len(), "Fetched Poster expenses");
        Ok(filtered.kept)
    }

    async fn fetch_balance(&self) -> Result<Option<Money>, SourceError> {
        let accounts: Vec<PosterAccount> = self.call("finance.getAccounts", &[]).await?;
        tracing::info!(accounts = accounts.len(), "Received Poster accounts");

        match accounts.iter().find(|a| a.account_id == self.config.account_id) {
            Some(account) => {
                let balance = Money::from_minor_units(account.balance);
                tracing::info!(
                    account_id = account.account_id,
                    %balance,
                    currency = account.currency_code.as_deref().unwrap_or(""),
                    "Fetched Poster balance"
                );
                Ok(Some(balance))
            }
            None => {
                tracing::error!(
                    account_id = self.config.account_id,
                    "Configured Poster account not found in response"
                );
                Ok(None)
            }
        }
    }
}

/// Poster wraps every payload as `{"response": ...}` or `{"error": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, SourceError> {
        if let Some(error) = self.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            return Err(SourceError::Api {
                feed: Source::Poster,
                message,
            });
        }
        self.response.ok_or_else(|| SourceError::Api {
            feed: Source::Poster,
            message: "response field missing".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PosterAccount {
    #[serde(deserialize_with = "de::int")]
    account_id: i64,
    /// Minor units.
    #[serde(deserialize_with = "de::int")]
    balance: i64,
    #[serde(default)]
    currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PosterRecord {
    #[serde(default, deserialize_with = "de::opt_string")]
    transaction_id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    date_create_timestamp: Option<i64>,
    /// Minor units, signed.
    #[serde(deserialize_with = "de::int")]
    amount: i64,
    #[serde(default)]
    comment: Option<String>,
}

struct Filtered {
    kept: Vec<NormalizedTransaction>,
    excluded: usize,
}

fn collect_expenses(raw: Vec<Value>, exclude_keyword: Option<&str>) -> Filtered {
    let exclude = exclude_keyword.map(str::to_lowercase);
    let mut kept = Vec::new();
    let mut excluded = 0;

    for value in raw {
        let tx = match normalize(value) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!("Dropping Poster record: {e}");
                continue;
            }
        };
        if !tx.amount.is_negative() {
            continue;
        }
        let is_fee = match (&exclude, &tx.description) {
            (Some(kw), Some(desc)) => desc.to_lowercase().contains(kw.as_str()),
            _ => false,
        };
        if is_fee {
            tracing::debug!(id = %tx.id, "Excluding Poster fee record");
            excluded += 1;
        } else {
            kept.push(tx);
        }
    }

    Filtered { kept, excluded }
}

fn normalize(value: Value) -> Result<NormalizedTransaction, NormalizeError> {
    let record = PosterRecord::deserialize(&value)?;
    let id = record.transaction_id.ok_or(NormalizeError::MissingId)?;

    let time = parse_time(record.date.as_deref(), record.date_create_timestamp);
    if time.is_none() {
        tracing::warn!(%id, "Poster record has no parseable time");
    }

    let mut tx = NormalizedTransaction::new(
        Source::Poster,
        TransactionId::from(id),
        Money::from_minor_units(record.amount),
    );
    tx.time = time;
    tx.description = record.comment;
    Ok(tx.with_raw(value))
}

/// Prefers the `date` string; falls back to the creation timestamp
/// (seconds, rendered in local time).
fn parse_time(date: Option<&str>, timestamp: Option<i64>) -> Option<NaiveDateTime> {
    if let Some(d) = date.map(str::trim).filter(|d| !d.is_empty()) {
        return NaiveDateTime::parse_from_str(d, "%Y-%m-%d %H:%M:%S").ok();
    }
    timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|utc| utc.with_timezone(&Local).naive_local())
}
