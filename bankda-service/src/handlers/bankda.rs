//! Admin handlers for the bankda reconciliation surface.

use crate::dtos::{
    IgnoreRequest, ManualMatchRequest, MemberSearchParams, MemberSearchResult, MessageResponse,
    SummaryResponse, SyncResponse, TransactionListParams, TransactionResponse,
};
use crate::models::{DepositSource, MatchStatus};
use crate::services::{CreditOutcome, CycleOutcome};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// GET /api/admin/bankda/summary
pub async fn get_summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = state.sync.summary().await?;
    Ok(Json(SummaryResponse::from(summary)))
}

/// Dates arrive either in the ledger's fixed-width YYYYMMDD form or dashed;
/// dashes are tolerated and stripped.
fn normalize_bkdate(name: &str, value: &str) -> Result<String, AppError> {
    let digits: String = value.chars().filter(|c| *c != '-').collect();
    if digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(digits);
    }
    Err(AppError::BadRequest(anyhow::anyhow!(
        "{} must be an 8-digit YYYYMMDD date",
        name
    )))
}

/// GET /api/admin/bankda/transactions?status=&startDate=&endDate=
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<TransactionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            MatchStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown status '{}'", s)))
        })
        .transpose()?;

    let start_date = params
        .start_date
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| normalize_bkdate("startDate", s))
        .transpose()?;
    let end_date = params
        .end_date
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| normalize_bkdate("endDate", s))
        .transpose()?;

    let transactions = state
        .db
        .list_transactions(status, start_date.as_deref(), end_date.as_deref())
        .await?;

    let response: Vec<TransactionResponse> =
        transactions.into_iter().map(TransactionResponse::from).collect();

    Ok(Json(response))
}

/// GET /api/admin/bankda/search-members?q=
pub async fn search_members(
    State(state): State<AppState>,
    Query(params): Query<MemberSearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Ok(Json(Vec::<MemberSearchResult>::new()));
    }

    let members = state.db.search_members(query).await?;
    let response: Vec<MemberSearchResult> =
        members.into_iter().map(MemberSearchResult::from).collect();

    Ok(Json(response))
}

/// POST /api/admin/bankda/sync
pub async fn trigger_sync(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let response = match state.sync.run_cycle().await? {
        CycleOutcome::Completed(report) => SyncResponse::completed(report),
        CycleOutcome::RateLimited => SyncResponse::rate_limited(),
        CycleOutcome::FetchFailed(reason) => SyncResponse::failed(reason),
    };

    Ok(Json(response))
}

/// POST /api/admin/bankda/transactions/:id/manual-match
pub async fn manual_match(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(body): Json<ManualMatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .db
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    let status = transaction.status();
    // `manual` with a failed charge stays eligible so the operator can retry.
    let eligible =
        status.is_resolvable() || (status == MatchStatus::Manual && !transaction.deposit_charged);
    if !eligible {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Transaction in status '{}' cannot be manually matched",
            transaction.match_status
        )));
    }

    let member = state
        .db
        .get_member(body.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Member not found")))?;

    state
        .db
        .set_match_result(transaction_id, MatchStatus::Manual, Some(member.member_id))
        .await?;

    match state
        .db
        .credit_transaction(transaction_id, member.member_id, DepositSource::BankdaManual)
        .await
    {
        Ok(CreditOutcome::Credited { .. }) => Ok(Json(MessageResponse {
            message: format!(
                "Transaction matched to {} and deposit credited",
                member.member_name
            ),
        })),
        Ok(CreditOutcome::AlreadyCharged) => Err(AppError::Conflict(anyhow::anyhow!(
            "Transaction is already credited"
        ))),
        Err(e) => {
            state
                .db
                .record_charge_error(transaction_id, &e.to_string())
                .await?;
            Err(e)
        }
    }
}

/// POST /api/admin/bankda/transactions/:id/ignore
pub async fn ignore_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(body): Json<IgnoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .db
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    if !transaction.status().is_resolvable() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Transaction in status '{}' cannot be ignored",
            transaction.match_status
        )));
    }

    state
        .db
        .set_ignored(transaction_id, &body.memo)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "Transaction is no longer eligible to be ignored"
            ))
        })?;

    Ok(Json(MessageResponse {
        message: "Transaction ignored".to_string(),
    }))
}
