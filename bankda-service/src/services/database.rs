//! Database service for bankda-service.
//!
//! Every query the engine issues lives here; handlers and the sync engine
//! never touch the pool directly. The crediting path is the one place with
//! a strong consistency requirement and is implemented as a single Postgres
//! transaction with a row lock on the transaction record.

use crate::models::{
    BankTransaction, DepositHistoryEntry, DepositSource, MatchStatus, Member, MemberName,
    SyncSummary,
};
use crate::services::bankda::RawBankRow;
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "transaction_id, identity_key, bank_code, account_number, \
     bkdate, bktime, bkjukyo, bkcontent, bketc, credit_amount, debit_amount, balance, \
     match_status, matched_member_id, matched_at, deposit_charged, deposit_history_id, \
     charge_error, admin_memo, created_utc";

/// Result of a crediting attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { deposit_history_id: Uuid },
    /// The transaction was already charged; nothing was mutated.
    AlreadyCharged,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "bankda-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Member Directory Operations
    // =========================================================================

    /// Snapshot of member names for one matching pass.
    #[instrument(skip(self))]
    pub async fn member_snapshot(&self) -> Result<Vec<MemberName>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["member_snapshot"])
            .start_timer();

        let members = sqlx::query_as::<_, MemberName>(
            r#"
            SELECT member_id, member_name
            FROM members
            ORDER BY member_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load member snapshot: {}", e))
        })?;

        timer.observe_duration();

        Ok(members)
    }

    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn get_member(&self, member_id: Uuid) -> Result<Option<Member>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_member"])
            .start_timer();

        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT member_id, member_name, company_name, phone, deposit, grade, created_utc, updated_utc
            FROM members
            WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get member: {}", e)))?;

        timer.observe_duration();

        Ok(member)
    }

    /// Case-insensitive substring search over name, company, and phone.
    /// Feeds the operator's manual-match candidate list only; the automatic
    /// matcher never uses it.
    #[instrument(skip(self))]
    pub async fn search_members(&self, query: &str) -> Result<Vec<Member>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["search_members"])
            .start_timer();

        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));

        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT member_id, member_name, company_name, phone, deposit, grade, created_utc, updated_utc
            FROM members
            WHERE member_name ILIKE $1 OR company_name ILIKE $1 OR phone ILIKE $1
            ORDER BY member_name, member_id
            LIMIT 50
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search members: {}", e)))?;

        timer.observe_duration();

        Ok(members)
    }

    // =========================================================================
    // Transaction Ledger Operations
    // =========================================================================

    /// Persist one fetched row in `pending`. Returns `None` when the identity
    /// key is already in the ledger (the row is skipped, never reprocessed).
    #[instrument(skip(self, row), fields(identity_key = %identity_key))]
    pub async fn insert_pending_transaction(
        &self,
        row: &RawBankRow,
        identity_key: &str,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_pending_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            INSERT INTO bank_transactions
                (transaction_id, identity_key, bank_code, account_number, bkdate, bktime,
                 bkjukyo, bkcontent, bketc, credit_amount, debit_amount, balance, match_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (identity_key) DO NOTHING
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(identity_key)
        .bind(&row.bank_code)
        .bind(&row.account_number)
        .bind(&row.bkdate)
        .bind(&row.bktime)
        .bind(&row.bkjukyo)
        .bind(&row.bkcontent)
        .bind(&row.bketc)
        .bind(row.credit_amount)
        .bind(row.debit_amount)
        .bind(row.balance)
        .bind(MatchStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(transaction)
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            SELECT {}
            FROM bank_transactions
            WHERE transaction_id = $1
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get transaction: {}", e)))?;

        timer.observe_duration();

        Ok(transaction)
    }

    /// List ledger records, newest first, with optional status and bkdate
    /// range filters.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        status: Option<MatchStatus>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let transactions = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            SELECT {}
            FROM bank_transactions
            WHERE ($1::text IS NULL OR match_status = $1)
              AND ($2::text IS NULL OR bkdate >= $2)
              AND ($3::text IS NULL OR bkdate <= $3)
            ORDER BY bkdate DESC, bktime DESC, created_utc DESC
            LIMIT 1000
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }

    /// Persist a match decision. `matched_at` and `matched_member_id` are
    /// only set when a member is attached.
    #[instrument(skip(self), fields(transaction_id = %transaction_id, status = %status.as_str()))]
    pub async fn set_match_result(
        &self,
        transaction_id: Uuid,
        status: MatchStatus,
        member_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_match_result"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET match_status = $2,
                matched_member_id = COALESCE($3, matched_member_id),
                matched_at = CASE WHEN $3 IS NOT NULL THEN NOW() ELSE matched_at END
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(status.as_str())
        .bind(member_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set match result: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// Record a crediting failure on the transaction for operator visibility.
    #[instrument(skip(self, reason), fields(transaction_id = %transaction_id))]
    pub async fn record_charge_error(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_charge_error"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET charge_error = $2
            WHERE transaction_id = $1 AND deposit_charged = FALSE
            "#,
        )
        .bind(transaction_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record charge error: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// Mark a transaction ignored with an operator memo. Returns the updated
    /// record, or `None` when the transaction is not in an eligible status.
    #[instrument(skip(self, memo), fields(transaction_id = %transaction_id))]
    pub async fn set_ignored(
        &self,
        transaction_id: Uuid,
        memo: &str,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_ignored"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(&format!(
            r#"
            UPDATE bank_transactions
            SET match_status = $2, admin_memo = $3
            WHERE transaction_id = $1
              AND match_status IN ('pending', 'unmatched', 'duplicate_name')
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .bind(MatchStatus::Ignored.as_str())
        .bind(memo)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to ignore transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(transaction)
    }

    // =========================================================================
    // Deposit Crediting
    // =========================================================================

    /// Credit a matched or manually matched transaction to a member, exactly
    /// once per transaction identity.
    ///
    /// The whole step is one Postgres transaction: the record row is locked,
    /// the precondition is re-checked under the lock, and the balance
    /// increment, history append, and status flip commit together or not at
    /// all. Concurrent callers for the same transaction serialize on the row
    /// lock; the loser observes `AlreadyCharged`.
    #[instrument(skip(self), fields(transaction_id = %transaction_id, member_id = %member_id, source = %source.as_str()))]
    pub async fn credit_transaction(
        &self,
        transaction_id: Uuid,
        member_id: Uuid,
        source: DepositSource,
    ) -> Result<CreditOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["credit_transaction"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let record = sqlx::query_as::<_, (String, i64, bool, String)>(
            r#"
            SELECT identity_key, credit_amount, deposit_charged, match_status
            FROM bank_transactions
            WHERE transaction_id = $1
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock transaction: {}", e))
        })?;

        let (identity_key, credit_amount, deposit_charged, match_status) = record
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

        if deposit_charged {
            timer.observe_duration();
            return Ok(CreditOutcome::AlreadyCharged);
        }

        match MatchStatus::from_str(&match_status) {
            MatchStatus::Matched | MatchStatus::Manual => {}
            _ => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction in status '{}' cannot be credited",
                    match_status
                )));
            }
        }

        let updated = sqlx::query(
            r#"
            UPDATE members
            SET deposit = deposit + $2, updated_utc = NOW()
            WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .bind(credit_amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update member balance: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Member not found")));
        }

        let deposit_history_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO deposit_history (history_id, member_id, amount, source, transaction_identity)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(deposit_history_id)
        .bind(member_id)
        .bind(credit_amount)
        .bind(source.as_str())
        .bind(&identity_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to append deposit history: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET deposit_charged = TRUE,
                deposit_history_id = $2,
                matched_member_id = $3,
                matched_at = NOW(),
                charge_error = NULL
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(deposit_history_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark transaction charged: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit credit: {}", e))
        })?;

        timer.observe_duration();
        info!(
            transaction_id = %transaction_id,
            member_id = %member_id,
            amount = credit_amount,
            "Deposit credited"
        );

        Ok(CreditOutcome::Credited { deposit_history_id })
    }

    /// Deposit history entries for one member, oldest first.
    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn member_deposit_history(
        &self,
        member_id: Uuid,
    ) -> Result<Vec<DepositHistoryEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["member_deposit_history"])
            .start_timer();

        let entries = sqlx::query_as::<_, DepositHistoryEntry>(
            r#"
            SELECT history_id, member_id, amount, source, transaction_identity, created_utc
            FROM deposit_history
            WHERE member_id = $1
            ORDER BY created_utc, history_id
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load deposit history: {}", e))
        })?;

        timer.observe_duration();

        Ok(entries)
    }

    // =========================================================================
    // Summary & Sync State
    // =========================================================================

    /// Compute the sync summary from the ledger. `today` is the bkdate to
    /// bucket today's figures on (injected for deterministic tests).
    #[instrument(skip(self))]
    pub async fn sync_summary(&self, today: &str) -> Result<SyncSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sync_summary"])
            .start_timer();

        let (today_count, today_amount, matched_count, unmatched_count) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE bkdate = $1),
                    COALESCE(SUM(credit_amount) FILTER (WHERE bkdate = $1), 0)::BIGINT,
                    COUNT(*) FILTER (WHERE match_status IN ('matched', 'manual')),
                    COUNT(*) FILTER (WHERE match_status IN ('unmatched', 'duplicate_name'))
                FROM bank_transactions
                "#,
            )
            .bind(today)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to compute summary: {}", e))
            })?;

        let last_sync_utc = sqlx::query_as::<_, (Option<DateTime<Utc>>,)>(
            r#"
            SELECT last_sync_utc FROM sync_state WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read sync state: {}", e)))?
        .and_then(|row| row.0);

        timer.observe_duration();

        Ok(SyncSummary {
            today_count,
            today_amount,
            matched_count,
            unmatched_count,
            last_sync_utc,
        })
    }

    /// Last provider cursor successfully processed, if any.
    #[instrument(skip(self))]
    pub async fn get_sync_cursor(&self) -> Result<Option<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_sync_cursor"])
            .start_timer();

        let cursor = sqlx::query_as::<_, (Option<String>,)>(
            r#"
            SELECT last_cursor FROM sync_state WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read sync cursor: {}", e)))?
        .and_then(|row| row.0);

        timer.observe_duration();

        Ok(cursor)
    }

    /// Advance the cursor and stamp a completed cycle. A `None` cursor keeps
    /// the previous one (the provider had nothing new).
    #[instrument(skip(self))]
    pub async fn update_sync_state(&self, next_cursor: Option<&str>) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_sync_state"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_cursor = COALESCE($1, last_cursor), last_sync_utc = NOW()
            WHERE id = 1
            "#,
        )
        .bind(next_cursor)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update sync state: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }
}
