pub(crate) mod de;
pub mod error;
pub(crate) mod http;
pub mod poster;
pub mod privat;

pub use error::{NormalizeError, SourceError};
pub use poster::{PosterClient, PosterConfig};
pub use privat::{PrivatClient, PrivatConfig};

use async_trait::async_trait;
use kassa_core::{Money, NormalizedTransaction, Source, SyncWindow};

/// One of the two feeds being reconciled.
///
/// Implementations return fully materialized lists. Individual records that
/// cannot be normalized are dropped with a warning; anything that makes the
/// whole response untrustworthy is an error.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch_transactions(
        &self,
        window: &SyncWindow,
    ) -> Result<Vec<NormalizedTransaction>, SourceError>;

    /// `Ok(None)` when the feed answers but reports no balance for the account.
    async fn fetch_balance(&self) -> Result<Option<Money>, SourceError>;
}
