//! Domain models for bankda-service.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Match Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Pending,
    Matched,
    Unmatched,
    DuplicateName,
    Manual,
    Ignored,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::DuplicateName => "duplicate_name",
            Self::Manual => "manual",
            Self::Ignored => "ignored",
        }
    }

    /// Strict parse of the wire/storage name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "matched" => Some(Self::Matched),
            "unmatched" => Some(Self::Unmatched),
            "duplicate_name" => Some(Self::DuplicateName),
            "manual" => Some(Self::Manual),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Pending)
    }

    /// Statuses an operator may still act on through manual resolution.
    pub fn is_resolvable(&self) -> bool {
        matches!(self, Self::Pending | Self::Unmatched | Self::DuplicateName)
    }
}

// ============================================================================
// Deposit Source
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositSource {
    BankdaAuto,
    BankdaManual,
}

impl DepositSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankdaAuto => "bankda-auto",
            Self::BankdaManual => "bankda-manual",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "bankda-manual" => Self::BankdaManual,
            _ => Self::BankdaAuto,
        }
    }
}

// ============================================================================
// Transaction Models
// ============================================================================

/// One ingested bank statement line. `bkdate`/`bktime` keep the provider's
/// fixed-width numeric form (YYYYMMDD / HHMMSS) verbatim.
#[derive(Debug, Clone, FromRow)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub identity_key: String,
    pub bank_code: String,
    pub account_number: String,
    pub bkdate: String,
    pub bktime: String,
    pub bkjukyo: String,
    pub bkcontent: String,
    pub bketc: String,
    pub credit_amount: i64,
    pub debit_amount: i64,
    pub balance: i64,
    pub match_status: String,
    pub matched_member_id: Option<Uuid>,
    pub matched_at: Option<DateTime<Utc>>,
    pub deposit_charged: bool,
    pub deposit_history_id: Option<Uuid>,
    pub charge_error: Option<String>,
    pub admin_memo: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn status(&self) -> MatchStatus {
        MatchStatus::from_str(&self.match_status)
    }
}

// ============================================================================
// Member Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct Member {
    pub member_id: Uuid,
    pub member_name: String,
    pub company_name: String,
    pub phone: String,
    pub deposit: i64,
    pub grade: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Directory snapshot entry used by the matcher.
#[derive(Debug, Clone, FromRow)]
pub struct MemberName {
    pub member_id: Uuid,
    pub member_name: String,
}

// ============================================================================
// Deposit History Models
// ============================================================================

/// Append-only ledger entry documenting one balance credit.
#[derive(Debug, Clone, FromRow)]
pub struct DepositHistoryEntry {
    pub history_id: Uuid,
    pub member_id: Uuid,
    pub amount: i64,
    pub source: String,
    pub transaction_identity: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Sync Summary
// ============================================================================

/// Computed on demand from the ledger, never cached.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub today_count: i64,
    pub today_amount: i64,
    pub matched_count: i64,
    pub unmatched_count: i64,
    pub last_sync_utc: Option<DateTime<Utc>>,
}
