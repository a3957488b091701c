use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::Money;
use super::transaction::NormalizedTransaction;

/// Balance differences at or below this are treated as equal.
pub const BALANCE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Outcome of comparing the two reported balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceStatus {
    Matched,
    Mismatch(Money),
    /// One or both balances were not reported.
    Indeterminate,
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub start_date: String,
    pub end_date: String,
    pub privat_transactions_count: usize,
    pub poster_transactions_count: usize,
    /// Pairs formed in this run only.
    pub matched_pairs_count: usize,
    pub unmatched_privat: Vec<NormalizedTransaction>,
    pub unmatched_poster: Vec<NormalizedTransaction>,
    pub all_privat_transactions: Vec<NormalizedTransaction>,
    pub all_poster_transactions: Vec<NormalizedTransaction>,
    pub privat_balance: Option<Money>,
    pub poster_balance: Option<Money>,
    pub error_message: Option<String>,
}

impl SyncReport {
    /// A report for a run that could not compare anything.
    pub fn failed(
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SyncReport {
            start_date: start_date.into(),
            end_date: end_date.into(),
            privat_transactions_count: 0,
            poster_transactions_count: 0,
            matched_pairs_count: 0,
            unmatched_privat: Vec::new(),
            unmatched_poster: Vec::new(),
            all_privat_transactions: Vec::new(),
            all_poster_transactions: Vec::new(),
            privat_balance: None,
            poster_balance: None,
            error_message: Some(message.into()),
        }
    }

    /// `privat - poster`, when both balances are known.
    pub fn balance_diff(&self) -> Option<Money> {
        match (self.privat_balance, self.poster_balance) {
            (Some(privat), Some(poster)) => Some(privat - poster),
            _ => None,
        }
    }

    pub fn balance_status(&self, tolerance: Money) -> BalanceStatus {
        match self.balance_diff() {
            Some(diff) if diff.abs() > tolerance => BalanceStatus::Mismatch(diff),
            Some(_) => BalanceStatus::Matched,
            None => BalanceStatus::Indeterminate,
        }
    }

    /// Recomputed on every call so later edits to balances or the error
    /// message are reflected.
    pub fn has_discrepancies(&self) -> bool {
        let balance_off = self
            .balance_diff()
            .is_some_and(|d| d.abs().as_decimal() > BALANCE_EPSILON);
        !self.unmatched_privat.is_empty()
            || !self.unmatched_poster.is_empty()
            || balance_off
            || self.error_message.is_some()
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched_privat.len() + self.unmatched_poster.len()
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Assembles a [`SyncReport`] from already-matched transaction lists.
///
/// The lists must carry their final `matched_status`; the unmatched residues
/// are derived from it.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    start_date: String,
    end_date: String,
    privat: Vec<NormalizedTransaction>,
    poster: Vec<NormalizedTransaction>,
    privat_balance: Option<Money>,
    poster_balance: Option<Money>,
    matched_pairs: usize,
    error_message: Option<String>,
}

impl ReportBuilder {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        ReportBuilder {
            start_date: start_date.into(),
            end_date: end_date.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn privat(mut self, transactions: Vec<NormalizedTransaction>, balance: Option<Money>) -> Self {
        self.privat = transactions;
        self.privat_balance = balance;
        self
    }

    #[must_use]
    pub fn poster(mut self, transactions: Vec<NormalizedTransaction>, balance: Option<Money>) -> Self {
        self.poster = transactions;
        self.poster_balance = balance;
        self
    }

    #[must_use]
    pub fn matched_pairs(mut self, count: usize) -> Self {
        self.matched_pairs = count;
        self
    }

    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn build(self) -> SyncReport {
        let unmatched_privat = unmatched(&self.privat);
        let unmatched_poster = unmatched(&self.poster);

        SyncReport {
            start_date: self.start_date,
            end_date: self.end_date,
            privat_transactions_count: self.privat.len(),
            poster_transactions_count: self.poster.len(),
            matched_pairs_count: self.matched_pairs,
            unmatched_privat,
            unmatched_poster,
            all_privat_transactions: self.privat,
            all_poster_transactions: self.poster,
            privat_balance: self.privat_balance,
            poster_balance: self.poster_balance,
            error_message: self.error_message,
        }
    }
}

fn unmatched(transactions: &[NormalizedTransaction]) -> Vec<NormalizedTransaction> {
    transactions
        .iter()
        .filter(|tx| !tx.matched_status)
        .cloned()
        .collect()
}
