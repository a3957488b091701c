use chrono::TimeDelta;
use kassa_core::{Money, NormalizedTransaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error("Amount tolerance must not be negative, got {0}")]
    NegativeTolerance(Money),
    #[error("Category relative tolerance must be within 0..=1, got {0}")]
    InvalidRelativePct(Decimal),
    #[error("Time window must be at least one minute")]
    EmptyTimeWindow,
    #[error("Category keyword must not be empty")]
    EmptyKeyword,
}

/// The rule set used to decide whether two records are the same payment.
/// Chosen once per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchRule {
    /// Amounts within tolerance and timestamps within the window; the closest
    /// timestamp wins. Records without a timestamp never match.
    TimeWindow {
        amount_tolerance: Money,
        time_window_minutes: u32,
    },
    /// Same sign and amounts within tolerance; the closest amount wins.
    /// Bank records whose description contains the keyword get a relative
    /// band of `category_relative_pct * |amount|`, never tighter than the
    /// baseline.
    AmountCategory {
        amount_tolerance: Money,
        #[serde(default)]
        category_keyword: Option<String>,
        #[serde(default = "default_relative_pct")]
        category_relative_pct: Decimal,
    },
}

fn default_relative_pct() -> Decimal {
    Decimal::new(10, 2)
}

impl Default for MatchRule {
    fn default() -> Self {
        MatchRule::AmountCategory {
            amount_tolerance: Money::from_minor_units(200),
            category_keyword: Some("Метро".to_string()),
            category_relative_pct: default_relative_pct(),
        }
    }
}

/// How far apart a qualifying pair is. Smaller is better; only values
/// produced by the same rule are ever compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Distance {
    Amount(Money),
    Time(TimeDelta),
}

impl MatchRule {
    pub fn time_window(amount_tolerance: Money, minutes: u32) -> Self {
        MatchRule::TimeWindow {
            amount_tolerance,
            time_window_minutes: minutes,
        }
    }

    pub fn amount_category(
        amount_tolerance: Money,
        category_keyword: Option<&str>,
        category_relative_pct: Decimal,
    ) -> Self {
        MatchRule::AmountCategory {
            amount_tolerance,
            category_keyword: category_keyword.map(str::to_string),
            category_relative_pct,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MatchRule::TimeWindow { .. } => "time_window",
            MatchRule::AmountCategory { .. } => "amount_category",
        }
    }

    /// The baseline absolute tolerance. Balance checks use only this.
    pub fn amount_tolerance(&self) -> Money {
        match self {
            MatchRule::TimeWindow { amount_tolerance, .. }
            | MatchRule::AmountCategory { amount_tolerance, .. } => *amount_tolerance,
        }
    }

    pub fn requires_time(&self) -> bool {
        matches!(self, MatchRule::TimeWindow { .. })
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.amount_tolerance().is_negative() {
            return Err(RuleError::NegativeTolerance(self.amount_tolerance()));
        }
        match self {
            MatchRule::TimeWindow {
                time_window_minutes, ..
            } => {
                if *time_window_minutes == 0 {
                    return Err(RuleError::EmptyTimeWindow);
                }
            }
            MatchRule::AmountCategory {
                category_keyword,
                category_relative_pct,
                ..
            } => {
                if category_keyword.as_deref().is_some_and(str::is_empty) {
                    return Err(RuleError::EmptyKeyword);
                }
                if *category_relative_pct < Decimal::ZERO || *category_relative_pct > Decimal::ONE {
                    return Err(RuleError::InvalidRelativePct(*category_relative_pct));
                }
            }
        }
        Ok(())
    }

    /// Tolerance applied when `a` (the bank record) is compared.
    pub fn effective_tolerance(&self, a: &NormalizedTransaction) -> Money {
        match self {
            MatchRule::TimeWindow { amount_tolerance, .. } => *amount_tolerance,
            MatchRule::AmountCategory {
                amount_tolerance,
                category_keyword,
                category_relative_pct,
            } => match category_keyword {
                Some(keyword) if a.description_contains(keyword) => {
                    (*amount_tolerance).max(a.amount.abs().scaled(*category_relative_pct))
                }
                _ => *amount_tolerance,
            },
        }
    }

    /// Returns `Some(distance)` if `b` qualifies as a counterpart for `a`.
    pub fn distance(&self, a: &NormalizedTransaction, b: &NormalizedTransaction) -> Option<Distance> {
        let amount_diff = a.amount.distance(b.amount);

        match self {
            MatchRule::TimeWindow {
                amount_tolerance,
                time_window_minutes,
            } => {
                let (ta, tb) = (a.time?, b.time?);
                if amount_diff > *amount_tolerance {
                    return None;
                }
                let delta = ta - tb;
                let delta = if delta < TimeDelta::zero() { -delta } else { delta };
                if delta > TimeDelta::minutes(i64::from(*time_window_minutes)) {
                    return None;
                }
                Some(Distance::Time(delta))
            }
            MatchRule::AmountCategory { .. } => {
                if !a.amount.same_sign(b.amount) {
                    return None;
                }
                if amount_diff > self.effective_tolerance(a) {
                    return None;
                }
                Some(Distance::Amount(amount_diff))
            }
        }
    }
}
