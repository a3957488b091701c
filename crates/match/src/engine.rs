use chrono::TimeDelta;
use kassa_core::{MatchedIds, Money, NormalizedTransaction, TransactionId};
use std::collections::HashSet;

use crate::observer::{MatchEvent, MatchObserver, NoopObserver};
use crate::rule::{Distance, MatchRule};

/// A pair formed during this run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    pub a_index: usize,
    pub b_index: usize,
    pub a_id: TransactionId,
    pub b_id: TransactionId,
    pub amount_diff: Money,
    /// Set only under the time-window rule.
    pub time_diff: Option<TimeDelta>,
}

/// Everything a matching pass decided. Inputs are left untouched; use
/// [`MatchOutcome::apply`] to get copies with `matched_status` set.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchedPair>,
    /// Per-index matched flag for side A, including previously matched ids.
    pub matched_a: Vec<bool>,
    pub matched_b: Vec<bool>,
    /// The incoming id set extended with every key matched in this run.
    pub matched_ids: MatchedIds,
}

impl MatchOutcome {
    /// Pairs formed in this run only.
    pub fn new_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn unmatched_a(&self) -> usize {
        self.matched_a.iter().filter(|m| !**m).count()
    }

    pub fn unmatched_b(&self) -> usize {
        self.matched_b.iter().filter(|m| !**m).count()
    }

    /// Returns the two lists with `matched_status` reflecting this outcome.
    pub fn apply(
        &self,
        mut a: Vec<NormalizedTransaction>,
        mut b: Vec<NormalizedTransaction>,
    ) -> (Vec<NormalizedTransaction>, Vec<NormalizedTransaction>) {
        debug_assert_eq!(a.len(), self.matched_a.len());
        debug_assert_eq!(b.len(), self.matched_b.len());

        for (tx, matched) in a.iter_mut().zip(&self.matched_a) {
            tx.matched_status = *matched;
        }
        for (tx, matched) in b.iter_mut().zip(&self.matched_b) {
            tx.matched_status = *matched;
        }
        (a, b)
    }
}

/// Greedy single-pass matcher: each A record, in order, takes the best
/// still-free B record under the configured [`MatchRule`]. Ties go to the
/// lower B index. No backtracking.
#[derive(Debug, Clone, Default)]
pub struct MatchEngine {
    rule: MatchRule,
}

impl MatchEngine {
    pub fn new(rule: MatchRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    pub fn run(
        &self,
        a: &[NormalizedTransaction],
        b: &[NormalizedTransaction],
        previously_matched: &MatchedIds,
    ) -> MatchOutcome {
        self.run_observed(a, b, previously_matched, &NoopObserver)
    }

    pub fn run_observed(
        &self,
        a: &[NormalizedTransaction],
        b: &[NormalizedTransaction],
        previously_matched: &MatchedIds,
        observer: &dyn MatchObserver,
    ) -> MatchOutcome {
        observer.on_event(MatchEvent::Started {
            rule: self.rule.kind(),
            side_a: a.len(),
            side_b: b.len(),
        });

        report_duplicates(a, observer);
        report_duplicates(b, observer);

        let mut ids = previously_matched.clone();
        let mut matched_a = mark_previously_matched(a, &ids, observer);
        let mut matched_b = mark_previously_matched(b, &ids, observer);
        let mut pairs = Vec::new();

        for (i, tx_a) in a.iter().enumerate() {
            if matched_a[i] {
                continue;
            }
            // A duplicate of an id paired earlier in this pass.
            if ids.contains(&tx_a.match_key()) {
                matched_a[i] = true;
                continue;
            }
            if self.rule.requires_time() && tx_a.time.is_none() {
                observer.on_event(MatchEvent::MissingTime {
                    id: tx_a.id.clone(),
                });
                continue;
            }

            match self.find_best_match(tx_a, b, &mut matched_b, &ids) {
                Some((j, distance)) => {
                    let tx_b = &b[j];
                    matched_a[i] = true;
                    matched_b[j] = true;
                    ids.insert(tx_a.match_key());
                    ids.insert(tx_b.match_key());

                    let amount_diff = tx_a.amount.distance(tx_b.amount);
                    observer.on_event(MatchEvent::Paired {
                        a: tx_a.id.clone(),
                        b: tx_b.id.clone(),
                        amount_diff,
                    });
                    pairs.push(MatchedPair {
                        a_index: i,
                        b_index: j,
                        a_id: tx_a.id.clone(),
                        b_id: tx_b.id.clone(),
                        amount_diff,
                        time_diff: match distance {
                            Distance::Time(delta) => Some(delta),
                            Distance::Amount(_) => None,
                        },
                    });
                }
                None => observer.on_event(MatchEvent::Unmatched {
                    id: tx_a.id.clone(),
                }),
            }
        }

        let outcome = MatchOutcome {
            pairs,
            matched_a,
            matched_b,
            matched_ids: ids,
        };
        observer.on_event(MatchEvent::Finished {
            new_pairs: outcome.new_pairs(),
            unmatched_a: outcome.unmatched_a(),
            unmatched_b: outcome.unmatched_b(),
        });
        outcome
    }

    /// Scans B in order for the closest qualifying candidate. B records whose
    /// key is already known are flagged as matched on the way.
    fn find_best_match(
        &self,
        tx_a: &NormalizedTransaction,
        b: &[NormalizedTransaction],
        matched_b: &mut [bool],
        ids: &MatchedIds,
    ) -> Option<(usize, Distance)> {
        let mut best: Option<(usize, Distance)> = None;

        for (j, tx_b) in b.iter().enumerate() {
            if matched_b[j] {
                continue;
            }
            if ids.contains(&tx_b.match_key()) {
                matched_b[j] = true;
                continue;
            }
            let Some(distance) = self.rule.distance(tx_a, tx_b) else {
                continue;
            };
            // Strict comparison keeps the first-seen candidate on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((j, distance));
            }
        }

        best
    }
}

fn mark_previously_matched(
    transactions: &[NormalizedTransaction],
    ids: &MatchedIds,
    observer: &dyn MatchObserver,
) -> Vec<bool> {
    transactions
        .iter()
        .map(|tx| {
            let known = ids.contains(&tx.match_key());
            if known {
                observer.on_event(MatchEvent::PreviouslyMatched {
                    source: tx.source,
                    id: tx.id.clone(),
                });
            }
            known
        })
        .collect()
}

fn report_duplicates(transactions: &[NormalizedTransaction], observer: &dyn MatchObserver) {
    let mut seen = HashSet::new();
    for tx in transactions {
        if !seen.insert(&tx.id) {
            observer.on_event(MatchEvent::DuplicateId {
                source: tx.source,
                id: tx.id.clone(),
            });
        }
    }
}
