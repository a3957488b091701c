pub mod engine;
pub mod observer;
pub mod rule;

pub use engine::{MatchEngine, MatchOutcome, MatchedPair};
pub use observer::{MatchEvent, MatchObserver, NoopObserver, RecordingObserver, TracingObserver};
pub use rule::{Distance, MatchRule, RuleError};
