use kassa_core::{Money, NormalizedTransaction, ReportBuilder, SyncReport, SyncWindow};
use kassa_match::{MatchEngine, TracingObserver};
use kassa_sources::{SourceError, TransactionSource};
use kassa_storage::MatchedIdStore;

/// Runs one reconciliation pass: fetch both feeds, match against the stored
/// id set, persist the extended set and build the report.
pub struct SyncManager<A, B, S> {
    privat: A,
    poster: B,
    store: S,
    engine: MatchEngine,
    date_format: String,
    dry_run: bool,
}

impl<A, B, S> SyncManager<A, B, S>
where
    A: TransactionSource,
    B: TransactionSource,
    S: MatchedIdStore,
{
    pub fn new(privat: A, poster: B, store: S, engine: MatchEngine) -> Self {
        SyncManager {
            privat,
            poster,
            store,
            engine,
            date_format: "%Y-%m-%d".to_string(),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// A dry run matches as usual but never writes the store.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run(&self, window: &SyncWindow) -> SyncReport {
        let (start, end) = window.labels(&self.date_format);
        tracing::info!(%start, %end, rule = self.engine.rule().kind(), "Starting PrivatBank-Poster sync");

        let (privat_txs, privat_balance, poster_txs, poster_balance) = tokio::join!(
            self.privat.fetch_transactions(window),
            self.privat.fetch_balance(),
            self.poster.fetch_transactions(window),
            self.poster.fetch_balance(),
        );

        let (privat_txs, poster_txs) = match (privat_txs, poster_txs) {
            (Err(privat_err), Err(poster_err)) => {
                tracing::error!(%privat_err, %poster_err, "Both transaction fetches failed");
                let report = SyncReport::failed(
                    start,
                    end,
                    format!(
                        "Sync failed: PrivatBank: {privat_err}; Poster: {poster_err}"
                    ),
                );
                log_summary(&report);
                return report;
            }
            (privat, poster) => (
                degrade(&self.privat, privat),
                degrade(&self.poster, poster),
            ),
        };
        let privat_balance = balance_or_none(&self.privat, privat_balance);
        let poster_balance = balance_or_none(&self.poster, poster_balance);

        let previously_matched = self.store.load();
        tracing::info!(
            privat = privat_txs.len(),
            poster = poster_txs.len(),
            known_ids = previously_matched.len(),
            "Comparing datasets"
        );

        let outcome =
            self.engine
                .run_observed(&privat_txs, &poster_txs, &previously_matched, &TracingObserver);
        let new_pairs = outcome.new_pairs();
        let (privat_txs, poster_txs) = outcome.apply(privat_txs, poster_txs);

        let mut builder = ReportBuilder::new(start, end)
            .privat(privat_txs, privat_balance)
            .poster(poster_txs, poster_balance)
            .matched_pairs(new_pairs);

        if self.dry_run {
            tracing::info!(
                would_store = outcome.matched_ids.len(),
                "Dry run, matched ids not saved"
            );
        } else if let Err(e) = self.store.save(&outcome.matched_ids) {
            tracing::error!("Failed to save matched ids: {e}");
            builder = builder.error(format!("Failed to save matched ids: {e}"));
        } else {
            tracing::info!(total = outcome.matched_ids.len(), "Matched ids saved");
        }

        let report = builder.build();
        if let Some(status) = balance_note(&report, self.engine.rule().amount_tolerance()) {
            tracing::warn!("{status}");
        }
        log_summary(&report);
        report
    }
}

fn degrade<T: TransactionSource>(
    source: &T,
    result: Result<Vec<NormalizedTransaction>, SourceError>,
) -> Vec<NormalizedTransaction> {
    match result {
        Ok(txs) => {
            tracing::info!(source = %source.source(), count = txs.len(), "Fetched transactions");
            txs
        }
        Err(e) => {
            tracing::error!(source = %source.source(), "Fetching transactions failed, continuing with none: {e}");
            Vec::new()
        }
    }
}

fn balance_or_none<T: TransactionSource>(
    source: &T,
    result: Result<Option<Money>, SourceError>,
) -> Option<Money> {
    match result {
        Ok(Some(balance)) => Some(balance),
        Ok(None) => {
            tracing::warn!(source = %source.source(), "No balance reported");
            None
        }
        Err(e) => {
            tracing::error!(source = %source.source(), "Fetching balance failed: {e}");
            None
        }
    }
}

fn balance_note(report: &SyncReport, tolerance: Money) -> Option<String> {
    use kassa_core::BalanceStatus;

    match report.balance_status(tolerance) {
        BalanceStatus::Mismatch(diff) => Some(format!(
            "Balance mismatch beyond tolerance {tolerance}: Privat - Poster = {diff}"
        )),
        BalanceStatus::Indeterminate => {
            Some("Balance comparison skipped, a balance is missing".to_string())
        }
        BalanceStatus::Matched => None,
    }
}

fn log_summary(report: &SyncReport) {
    if let Some(error) = &report.error_message {
        tracing::error!("Sync completed with error: {error}");
    } else if report.has_discrepancies() {
        tracing::warn!(
            matched = report.matched_pairs_count,
            unmatched_privat = report.unmatched_privat.len(),
            unmatched_poster = report.unmatched_poster.len(),
            "Sync completed with discrepancies"
        );
    } else {
        tracing::info!(
            matched = report.matched_pairs_count,
            "Sync completed with no discrepancies"
        );
    }
}
