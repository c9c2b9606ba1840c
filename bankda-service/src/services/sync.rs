//! Reconciliation sync engine: fetch, deduplicate, match, credit.

use crate::matching::{self, MatchOutcome};
use crate::models::{DepositSource, MatchStatus};
use crate::services::bankda::{BankdaProvider, ProviderError};
use crate::services::database::{CreditOutcome, Database};
use crate::services::metrics;
use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Counts for one completed sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub processed: u32,
    pub matched: u32,
    pub unmatched: u32,
    pub duplicates: u32,
    pub skipped: u32,
    pub credited: u32,
    pub charge_errors: u32,
}

/// Outcome of one sync cycle. Rate limiting and fetch failures are expected
/// cycle-level outcomes; `Err` is reserved for storage failures.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(SyncReport),
    RateLimited,
    FetchFailed(String),
}

/// Coordinates Fetcher, Matcher, and crediting for each cycle and owns the
/// cycle serialization: one logical cycle at a time, whether triggered by an
/// operator or the scheduler.
pub struct SyncService {
    db: Arc<Database>,
    provider: Arc<dyn BankdaProvider>,
    cycle_lock: Mutex<()>,
}

impl SyncService {
    pub fn new(db: Arc<Database>, provider: Arc<dyn BankdaProvider>) -> Self {
        Self {
            db,
            provider,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one fetch-match-credit cycle.
    ///
    /// Each row's persist + match + credit is its own atomic step; a failure
    /// crediting one row is recorded on that row and the cycle continues.
    /// The cursor and last-sync timestamp only advance on a completed cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleOutcome, AppError> {
        let _guard = self.cycle_lock.lock().await;

        let cursor = self.db.get_sync_cursor().await?;
        let batch = match self.provider.fetch_rows(cursor.as_deref()).await {
            Ok(batch) => batch,
            Err(ProviderError::RateLimited) => {
                info!("Provider rate limit reached, skipping cycle");
                metrics::record_sync_cycle("rate_limited");
                return Ok(CycleOutcome::RateLimited);
            }
            Err(e) => {
                warn!(error = %e, "Fetch failed, aborting cycle");
                metrics::record_sync_cycle("fetch_failed");
                metrics::record_error("provider");
                return Ok(CycleOutcome::FetchFailed(e.to_string()));
            }
        };

        let members = self.db.member_snapshot().await?;
        let mut report = SyncReport::default();

        // Provider order is chronological; keeping it makes the deposit
        // history deterministic.
        for row in &batch.rows {
            let identity_key = row.identity_key();

            let transaction = match self
                .db
                .insert_pending_transaction(row, &identity_key)
                .await?
            {
                Some(transaction) => transaction,
                None => {
                    report.skipped += 1;
                    metrics::record_ingested("skipped");
                    continue;
                }
            };
            report.processed += 1;
            metrics::record_ingested("ingested");

            let outcome = matching::match_transaction(&row.bkjukyo, &row.bketc, &members);
            match outcome {
                MatchOutcome::Matched(member_id) => {
                    report.matched += 1;
                    metrics::record_match("matched");
                    self.db
                        .set_match_result(transaction.transaction_id, MatchStatus::Matched, Some(member_id))
                        .await?;

                    match self
                        .db
                        .credit_transaction(
                            transaction.transaction_id,
                            member_id,
                            DepositSource::BankdaAuto,
                        )
                        .await
                    {
                        Ok(CreditOutcome::Credited { .. }) => {
                            report.credited += 1;
                            metrics::record_credit("bankda-auto", "credited");
                        }
                        Ok(CreditOutcome::AlreadyCharged) => {
                            metrics::record_credit("bankda-auto", "already_charged");
                        }
                        Err(e) => {
                            warn!(
                                transaction_id = %transaction.transaction_id,
                                error = %e,
                                "Crediting failed, continuing cycle"
                            );
                            report.charge_errors += 1;
                            metrics::record_credit("bankda-auto", "error");
                            self.db
                                .record_charge_error(transaction.transaction_id, &e.to_string())
                                .await?;
                        }
                    }
                }
                MatchOutcome::Unmatched => {
                    report.unmatched += 1;
                    metrics::record_match("unmatched");
                    self.db
                        .set_match_result(transaction.transaction_id, MatchStatus::Unmatched, None)
                        .await?;
                }
                MatchOutcome::DuplicateName => {
                    report.duplicates += 1;
                    metrics::record_match("duplicate_name");
                    self.db
                        .set_match_result(
                            transaction.transaction_id,
                            MatchStatus::DuplicateName,
                            None,
                        )
                        .await?;
                }
            }
        }

        self.db
            .update_sync_state(batch.next_cursor.as_deref())
            .await?;

        metrics::record_sync_cycle("completed");
        info!(
            processed = report.processed,
            matched = report.matched,
            unmatched = report.unmatched,
            duplicates = report.duplicates,
            skipped = report.skipped,
            credited = report.credited,
            charge_errors = report.charge_errors,
            "Sync cycle completed"
        );

        Ok(CycleOutcome::Completed(report))
    }

    /// Today's figures plus overall match counts, straight from the ledger.
    pub async fn summary(&self) -> Result<crate::models::SyncSummary, AppError> {
        let today = Utc::now().format("%Y%m%d").to_string();
        self.db.sync_summary(&today).await
    }
}
