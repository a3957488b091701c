use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::money::Money;

/// Source-qualified keys of every transaction reconciled so far.
pub type MatchedIds = BTreeSet<String>;

/// Which feed a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// PrivatBank statement feed (side A).
    Privat,
    /// Poster point-of-sale payments (side B).
    Poster,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Privat => "privat",
            Source::Poster => "poster",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Privat => write!(f, "PrivatBank"),
            Source::Poster => write!(f, "Poster"),
        }
    }
}

/// Source-scoped transaction identifier. Feeds hand these out as strings or
/// integers; both are kept in their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => TransactionId(n.to_string()),
            Raw::Str(s) => TransactionId(s),
        })
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        TransactionId(s)
    }
}

impl From<i64> for TransactionId {
    fn from(n: i64) -> Self {
        TransactionId(n.to_string())
    }
}

/// Canonical transaction record, independent of the feed it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub id: TransactionId,
    pub source: Source,
    /// Absent when the feed gave no usable timestamp.
    pub time: Option<NaiveDateTime>,
    pub amount: Money,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub balance_after: Option<Money>,
    #[serde(default)]
    pub matched_status: bool,
    /// Original payload, kept for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl NormalizedTransaction {
    pub fn new(source: Source, id: impl Into<TransactionId>, amount: Money) -> Self {
        NormalizedTransaction {
            id: id.into(),
            source,
            time: None,
            amount,
            currency: None,
            description: None,
            balance_after: None,
            matched_status: false,
            raw: None,
        }
    }

    #[must_use]
    pub fn with_time(mut self, time: NaiveDateTime) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Key under which this record is remembered in the matched-id store.
    /// Qualified by source so equal raw ids from the two feeds never collide.
    pub fn match_key(&self) -> String {
        format!("{}:{}", self.source.as_str(), self.id)
    }

    /// Case-sensitive substring test on the description.
    pub fn description_contains(&self, keyword: &str) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.contains(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_deserializes_from_int_or_string() {
        let a: TransactionId = serde_json::from_str("12345").unwrap();
        let b: TransactionId = serde_json::from_str("\"12345\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"12345\"");
    }

    #[test]
    fn match_key_is_source_qualified() {
        let a = NormalizedTransaction::new(Source::Privat, "77", Money::zero());
        let b = NormalizedTransaction::new(Source::Poster, 77_i64, Money::zero());
        assert_eq!(a.match_key(), "privat:77");
        assert_eq!(b.match_key(), "poster:77");
    }

    #[test]
    fn description_check_is_case_sensitive() {
        let tx = NormalizedTransaction::new(Source::Privat, "1", Money::zero())
            .with_description("Метро proїзд");
        assert!(tx.description_contains("Метро"));
        assert!(!tx.description_contains("метро"));

        let blank = NormalizedTransaction::new(Source::Privat, "2", Money::zero());
        assert!(!blank.description_contains("Метро"));
    }

    #[test]
    fn new_defaults_to_unmatched() {
        let tx = NormalizedTransaction::new(Source::Poster, "1", Money::from_minor_units(-100));
        assert!(!tx.matched_status);
        assert!(tx.time.is_none());
    }
}
