use async_trait::async_trait;
use chrono::NaiveDateTime;
use kassa_core::{Money, NormalizedTransaction, Source, SyncWindow, TransactionId};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::de;
use crate::error::{NormalizeError, SourceError};
use crate::http;
use crate::TransactionSource;

pub const PRIVAT_API_URL: &str = "https://acp.privatbank.ua/api";

/// Upper bound on statement pages followed in one fetch.
const MAX_PAGES: usize = 50;

const STATUS_SUCCESS: &str = "SUCCESS";

#[derive(Clone, Deserialize)]
pub struct PrivatConfig {
    /// May be left out of the file and supplied from the environment.
    #[serde(default)]
    pub token: String,
    pub iban: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Records per statement page (the API allows up to 500).
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    PRIVAT_API_URL.to_string()
}

fn default_page_limit() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

impl fmt::Debug for PrivatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivatConfig")
            .field("token", &"***")
            .field("iban", &masked_iban(&self.iban))
            .field("base_url", &self.base_url)
            .field("page_limit", &self.page_limit)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// First six characters of an IBAN, enough to tell accounts apart in logs.
fn masked_iban(iban: &str) -> String {
    let head: String = iban.chars().take(6).collect();
    format!("{head}...")
}

/// PrivatBank business statement API. Only debits are kept.
pub struct PrivatClient {
    config: PrivatConfig,
    http: reqwest::Client,
}

impl PrivatClient {
    pub fn new(config: PrivatConfig) -> Result<Self, SourceError> {
        if config.token.trim().is_empty() {
            return Err(config_error("token is missing"));
        }
        if config.iban.trim().is_empty() {
            return Err(config_error("iban is missing"));
        }
        let http = http::client(config.timeout_secs)?;
        tracing::info!(iban = %masked_iban(&config.iban), "PrivatBank client initialized");
        Ok(Self { config, http })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/{path}", self.config.base_url.trim_end_matches('/')))
            .header("token", &self.config.token)
            .header("Content-Type", "application/json;charset=utf-8")
    }
}

fn config_error(message: &str) -> SourceError {
    SourceError::Config {
        feed: Source::Privat,
        message: message.to_string(),
    }
}

#[async_trait]
impl TransactionSource for PrivatClient {
    fn source(&self) -> Source {
        Source::Privat
    }

    async fn fetch_transactions(
        &self,
        window: &SyncWindow,
    ) -> Result<Vec<NormalizedTransaction>, SourceError> {
        let start = window.start.format("%d-%m-%Y").to_string();
        let end = window.end.format("%d-%m-%Y").to_string();
        let limit = self.config.page_limit.to_string();

        let mut transactions = Vec::new();
        let mut follow_id: Option<String> = None;

        for page_no in 1..=MAX_PAGES {
            tracing::info!(
                iban = %masked_iban(&self.config.iban),
                %window,
                page = page_no,
                "Requesting PrivatBank statement"
            );

            let mut req = self.get("statements/transactions").query(&[
                ("acc", self.config.iban.as_str()),
                ("startDate", start.as_str()),
                ("endDate", end.as_str()),
                ("limit", limit.as_str()),
            ]);
            if let Some(id) = &follow_id {
                req = req.query(&[("followId", id.as_str())]);
            }

            let page: StatementPage = http::send_json(req, Source::Privat).await?;
            page.check_status()?;

            let received = page.transactions.len();
            let debits = collect_debits(page.transactions);
            tracing::info!(received, kept = debits.len(), "PrivatBank page processed");
            transactions.extend(debits);

            match (page.exist_next_page, page.next_page_id) {
                (true, Some(next)) => follow_id = Some(next),
                _ => return Ok(transactions),
            }
        }

        tracing::warn!("Stopped following PrivatBank pages after {MAX_PAGES}");
        Ok(transactions)
    }

    async fn fetch_balance(&self) -> Result<Option<Money>, SourceError> {
        tracing::info!(iban = %masked_iban(&self.config.iban), "Requesting PrivatBank balance");
        let req = self
            .get("statements/balance/final")
            .query(&[("acc", self.config.iban.as_str())]);

        let resp: BalanceResponse = http::send_json(req, Source::Privat).await?;
        if resp.status != STATUS_SUCCESS {
            return Err(api_error(&resp.status, resp.message.as_deref()));
        }
        let balance = select_balance(&resp.balances, &self.config.iban)?;
        match balance {
            Some(b) => tracing::info!(balance = %b, "Fetched PrivatBank balance"),
            None => tracing::warn!("PrivatBank response carried no balance for the account"),
        }
        Ok(balance)
    }
}

#[derive(Debug, Deserialize)]
struct StatementPage {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    exist_next_page: bool,
    #[serde(default, deserialize_with = "de::opt_string")]
    next_page_id: Option<String>,
    #[serde(default)]
    transactions: Vec<Value>,
}

impl StatementPage {
    fn check_status(&self) -> Result<(), SourceError> {
        if self.status == STATUS_SUCCESS {
            Ok(())
        } else {
            Err(api_error(&self.status, self.message.as_deref()))
        }
    }
}

fn api_error(status: &str, message: Option<&str>) -> SourceError {
    SourceError::Api {
        feed: Source::Privat,
        message: format!("{status}: {}", message.unwrap_or("no details")),
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    #[serde(default)]
    acc: Option<String>,
    #[serde(rename = "balanceOut", default, deserialize_with = "de::opt_string")]
    balance_out: Option<String>,
}

/// Picks the entry for `iban` (or the only entry) and parses its closing
/// balance.
fn select_balance(entries: &[BalanceEntry], iban: &str) -> Result<Option<Money>, SourceError> {
    let entry = entries
        .iter()
        .find(|e| e.acc.as_deref() == Some(iban))
        .or_else(|| entries.first().filter(|_| entries.len() == 1));

    let Some(raw) = entry.and_then(|e| e.balance_out.as_deref()) else {
        return Ok(None);
    };
    raw.parse::<Money>().map(Some).map_err(|_| SourceError::Api {
        feed: Source::Privat,
        message: format!("unparseable balance '{raw}'"),
    })
}

#[derive(Debug, Deserialize)]
struct PrivatRecord {
    #[serde(rename = "ID", default, deserialize_with = "de::opt_string")]
    id: Option<String>,
    #[serde(rename = "DAT_OD", default)]
    date: Option<String>,
    #[serde(rename = "TIM_P", default)]
    time: Option<String>,
    #[serde(rename = "DATE_TIME_DAT_OD_TIM_P", default)]
    date_time: Option<String>,
    #[serde(rename = "SUM", default, deserialize_with = "de::opt_string")]
    sum: Option<String>,
    #[serde(rename = "CCY", default)]
    currency: Option<String>,
    #[serde(rename = "TRANTYPE", default)]
    kind: Option<String>,
    #[serde(rename = "OSND", default)]
    purpose: Option<String>,
}

/// Normalizes every record, dropping the unusable ones and the credits.
fn collect_debits(raw: Vec<Value>) -> Vec<NormalizedTransaction> {
    raw.into_iter()
        .filter_map(|value| match normalize(value) {
            Ok(tx) => Some(tx),
            Err(e) => {
                tracing::warn!("Dropping PrivatBank record: {e}");
                None
            }
        })
        .filter(|tx| tx.amount.is_negative())
        .collect()
}

fn normalize(value: Value) -> Result<NormalizedTransaction, NormalizeError> {
    let record = PrivatRecord::deserialize(&value)?;
    let id = record.id.ok_or(NormalizeError::MissingId)?;

    let sum = record.sum.unwrap_or_default();
    let magnitude = sum
        .replace(',', ".")
        .parse::<Money>()
        .map_err(|_| NormalizeError::InvalidAmount(sum.clone()))?
        .abs();
    // TRANTYPE is authoritative for the sign: D is a debit, anything else a credit.
    let amount = if record.kind.as_deref() == Some("D") {
        -magnitude
    } else {
        magnitude
    };

    let time = parse_time(
        record.date.as_deref(),
        record.time.as_deref(),
        record.date_time.as_deref(),
    );
    if time.is_none() {
        tracing::warn!(%id, "PrivatBank record has no parseable time");
    }

    let mut tx = NormalizedTransaction::new(Source::Privat, TransactionId::from(id), amount);
    tx.time = time;
    tx.currency = record.currency.filter(|c| !c.is_empty());
    tx.description = record.purpose;
    Ok(tx.with_raw(value))
}

fn parse_time(date: Option<&str>, time: Option<&str>, combined: Option<&str>) -> Option<NaiveDateTime> {
    if let (Some(d), Some(t)) = (date, time) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&format!("{} {}", d.trim(), t.trim()), "%d.%m.%Y %H:%M") {
            return Some(dt);
        }
    }
    combined.and_then(|c| NaiveDateTime::parse_from_str(c.trim(), "%d.%m.%Y %H:%M:%S").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(id: &str, sum: &str, kind: &str) -> Value {
        json!({
            "ID": id,
            "DAT_OD": "01.05.2025",
            "TIM_P": "10:15",
            "SUM": sum,
            "CCY": "UAH",
            "TRANTYPE": kind,
            "OSND": "Оплата Метро"
        })
    }

    #[test]
    fn normalizes_debit_record() {
        let tx = normalize(record("123", "100.50", "D")).unwrap();
        assert_eq!(tx.id.as_str(), "123");
        assert_eq!(tx.source, Source::Privat);
        assert_eq!(tx.amount, "-100.50".parse().unwrap());
        assert_eq!(tx.currency.as_deref(), Some("UAH"));
        assert_eq!(tx.description.as_deref(), Some("Оплата Метро"));
        assert_eq!(
            tx.time,
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap().and_hms_opt(10, 15, 0)
        );
        assert!(tx.raw.is_some());
        assert!(!tx.matched_status);
    }

    #[test]
    fn credit_keeps_positive_sign_even_if_sent_negative() {
        let tx = normalize(record("1", "-20", "C")).unwrap();
        assert_eq!(tx.amount, "20".parse().unwrap());
    }

    #[test]
    fn unparseable_time_keeps_record_without_time() {
        let mut v = record("1", "5", "D");
        v["TIM_P"] = json!("bogus");
        let tx = normalize(v).unwrap();
        assert!(tx.time.is_none());
    }

    #[test]
    fn combined_datetime_is_fallback() {
        let v = json!({
            "ID": "9", "SUM": "1", "TRANTYPE": "D",
            "DATE_TIME_DAT_OD_TIM_P": "02.05.2025 08:30:00"
        });
        let tx = normalize(v).unwrap();
        assert_eq!(
            tx.time,
            NaiveDate::from_ymd_opt(2025, 5, 2).unwrap().and_hms_opt(8, 30, 0)
        );
    }

    #[test]
    fn missing_id_or_bad_amount_is_rejected() {
        let mut v = record("1", "5", "D");
        v.as_object_mut().unwrap().remove("ID");
        assert!(matches!(normalize(v), Err(NormalizeError::MissingId)));
        assert!(matches!(
            normalize(record("1", "abc", "D")),
            Err(NormalizeError::InvalidAmount(_))
        ));
    }

    #[test]
    fn collect_keeps_only_valid_debits() {
        let raw = vec![
            record("1", "100", "D"),
            record("2", "50", "C"),
            record("3", "oops", "D"),
            json!("not an object"),
            record("4", "7,25", "D"),
        ];
        let kept = collect_debits(raw);
        let ids: Vec<_> = kept.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
        assert_eq!(kept[1].amount, "-7.25".parse().unwrap());
    }

    #[test]
    fn statement_page_parses_pagination() {
        let page: StatementPage = serde_json::from_value(json!({
            "status": "SUCCESS",
            "exist_next_page": true,
            "next_page_id": "abc_1",
            "transactions": [record("1", "1", "D")]
        }))
        .unwrap();
        assert!(page.check_status().is_ok());
        assert!(page.exist_next_page);
        assert_eq!(page.next_page_id.as_deref(), Some("abc_1"));
        assert_eq!(page.transactions.len(), 1);
    }

    #[test]
    fn non_success_status_is_api_error() {
        let page: StatementPage =
            serde_json::from_value(json!({"status": "ERROR", "message": "bad token"})).unwrap();
        let err = page.check_status().unwrap_err();
        assert!(matches!(err, SourceError::Api { .. }));
        assert!(err.to_string().contains("bad token"));
    }

    #[test]
    fn balance_selection() {
        let entries: Vec<BalanceEntry> = serde_json::from_value(json!([
            {"acc": "UA01", "balanceOut": "10.00"},
            {"acc": "UA02", "balanceOut": "2500.75"}
        ]))
        .unwrap();
        assert_eq!(select_balance(&entries, "UA02").unwrap(), Some("2500.75".parse().unwrap()));
        assert_eq!(select_balance(&entries, "UA99").unwrap(), None);
        assert_eq!(select_balance(&[], "UA01").unwrap(), None);

        let single: Vec<BalanceEntry> =
            serde_json::from_value(json!([{"balanceOut": 42.5}])).unwrap();
        assert_eq!(select_balance(&single, "UA01").unwrap(), Some("42.5".parse().unwrap()));

        let bad: Vec<BalanceEntry> =
            serde_json::from_value(json!([{"acc": "UA01", "balanceOut": "n/a"}])).unwrap();
        assert!(select_balance(&bad, "UA01").is_err());
    }

    #[test]
    fn config_debug_hides_token() {
        let cfg = PrivatConfig {
            token: "secret-token".into(),
            iban: "UA213223130000026007233566001".into(),
            base_url: default_base_url(),
            page_limit: 100,
            timeout_secs: 30,
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("UA2132..."));
    }

    #[test]
    fn new_rejects_missing_credentials() {
        let cfg = PrivatConfig {
            token: " ".into(),
            iban: "UA21".into(),
            base_url: default_base_url(),
            page_limit: 100,
            timeout_secs: 30,
        };
        assert!(matches!(PrivatClient::new(cfg), Err(SourceError::Config { .. })));
    }
}
