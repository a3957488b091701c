use kassa_core::{Money, Source, TransactionId};
use std::sync::{Mutex, PoisonError};

/// Structured events emitted while a matching pass runs.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    Started {
        rule: &'static str,
        side_a: usize,
        side_b: usize,
    },
    /// Two records in the same feed share an id.
    DuplicateId { source: Source, id: TransactionId },
    PreviouslyMatched { source: Source, id: TransactionId },
    /// Skipped because the active rule needs a timestamp.
    MissingTime { id: TransactionId },
    Paired {
        a: TransactionId,
        b: TransactionId,
        amount_diff: Money,
    },
    Unmatched { id: TransactionId },
    Finished {
        new_pairs: usize,
        unmatched_a: usize,
        unmatched_b: usize,
    },
}

/// Sink for [`MatchEvent`]s. The engine has no other way to report progress.
pub trait MatchObserver: Send + Sync {
    fn on_event(&self, event: MatchEvent);
}

pub struct NoopObserver;

impl MatchObserver for NoopObserver {
    fn on_event(&self, _event: MatchEvent) {}
}

/// Forwards events to `tracing`.
pub struct TracingObserver;

impl MatchObserver for TracingObserver {
    fn on_event(&self, event: MatchEvent) {
        match event {
            MatchEvent::Started { rule, side_a, side_b } => {
                tracing::info!(rule, side_a, side_b, "Starting comparison");
            }
            MatchEvent::DuplicateId { source, id } => {
                tracing::warn!(%source, %id, "Duplicate transaction id within one feed");
            }
            MatchEvent::PreviouslyMatched { source, id } => {
                tracing::debug!(%source, %id, "Already reconciled in an earlier run");
            }
            MatchEvent::MissingTime { id } => {
                tracing::debug!(%id, "No timestamp, cannot time-match");
            }
            MatchEvent::Paired { a, b, amount_diff } => {
                tracing::debug!(%a, %b, %amount_diff, "Matched pair");
            }
            MatchEvent::Unmatched { id } => {
                tracing::debug!(%id, "No qualifying counterpart");
            }
            MatchEvent::Finished {
                new_pairs,
                unmatched_a,
                unmatched_b,
            } => {
                tracing::info!(new_pairs, unmatched_a, unmatched_b, "Comparison finished");
            }
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MatchEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<MatchEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MatchObserver for RecordingObserver {
    fn on_event(&self, event: MatchEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
