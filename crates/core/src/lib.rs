pub mod money;
pub mod period;
pub mod report;
pub mod transaction;

pub use money::Money;
pub use period::{PeriodError, SyncWindow};
pub use report::{BalanceStatus, ReportBuilder, SyncReport, BALANCE_EPSILON};
pub use transaction::{MatchedIds, NormalizedTransaction, Source, TransactionId};
