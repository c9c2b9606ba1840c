//! Request/response types for the admin HTTP surface.

use crate::models::{BankTransaction, Member, SyncSummary};
use crate::services::SyncReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub today_count: i64,
    pub today_amount: i64,
    pub matched_count: i64,
    pub unmatched_count: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl From<SyncSummary> for SummaryResponse {
    fn from(s: SyncSummary) -> Self {
        Self {
            today_count: s.today_count,
            today_amount: s.today_amount,
            matched_count: s.matched_count,
            unmatched_count: s.unmatched_count,
            last_sync_at: s.last_sync_utc,
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListParams {
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

impl From<BankTransaction> for TransactionResponse {
    fn from(t: BankTransaction) -> Self {
        Self {
            id: t.transaction_id,
            identity_key: t.identity_key,
            bank_code: t.bank_code,
            account_number: t.account_number,
            bkdate: t.bkdate,
            bktime: t.bktime,
            bkjukyo: t.bkjukyo,
            bkcontent: t.bkcontent,
            bketc: t.bketc,
            credit_amount: t.credit_amount,
            debit_amount: t.debit_amount,
            balance: t.balance,
            match_status: t.match_status,
            matched_member_id: t.matched_member_id,
            matched_at: t.matched_at,
            deposit_charged: t.deposit_charged,
            deposit_history_id: t.deposit_history_id,
            charge_error: t.charge_error,
            admin_memo: t.admin_memo,
            created_at: t.created_utc,
        }
    }
}

// ============================================================================
// Member search
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MemberSearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSearchResult {
    pub id: Uuid,
    pub member_name: String,
    pub company_name: String,
    pub phone: String,
    pub deposit: i64,
    pub grade: String,
}

impl From<Member> for MemberSearchResult {
    fn from(m: Member) -> Self {
        Self {
            id: m.member_id,
            member_name: m.member_name,
            company_name: m.company_name,
            phone: m.phone,
            deposit: m.deposit,
            grade: m.grade,
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmatched: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    pub fn completed(report: SyncReport) -> Self {
        Self {
            success: true,
            processed: Some(report.processed),
            matched: Some(report.matched),
            // Duplicate-name rows join the unmatched bucket here; both wait
            // on an operator.
            unmatched: Some(report.unmatched + report.duplicates),
            skipped: Some(report.skipped),
            rate_limited: None,
            error: None,
        }
    }

    pub fn rate_limited() -> Self {
        Self {
            success: false,
            processed: None,
            matched: None,
            unmatched: None,
            skipped: None,
            rate_limited: Some(true),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            processed: None,
            matched: None,
            unmatched: None,
            skipped: None,
            rate_limited: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// Manual resolution
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualMatchRequest {
    pub member_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct IgnoreRequest {
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
