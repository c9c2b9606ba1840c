//! Bankda provider client.
//!
//! The provider is an opaque data source returning bank statement rows for
//! a configured account. The client's job is transport, rate-limit
//! detection, and transforming wire rows into validated `RawBankRow`s;
//! deduplication and persistence belong to the sync engine.

use crate::config::ProviderConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors surfaced by the provider boundary. Rate limiting is an expected,
/// non-fatal outcome and must stay distinguishable from real failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rate limit reached")]
    RateLimited,

    #[error("provider error {code}: {message}")]
    Api { code: String, message: String },

    #[error("provider transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// One validated deposit row as handed to the sync engine. Date and time
/// keep the provider's fixed-width numeric form verbatim.
#[derive(Debug, Clone)]
pub struct RawBankRow {
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
    pub sequence: i64,
}

impl RawBankRow {
    /// Provider identity used for re-sync deduplication.
    pub fn identity_key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.account_number, self.bkdate, self.bktime, self.sequence
        )
    }
}

/// A fetched window of rows plus the cursor to resume from next cycle.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub rows: Vec<RawBankRow>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait BankdaProvider: Send + Sync {
    /// Fetch statement rows after `cursor` (all of the current window when
    /// `None`). Never retries internally.
    async fn fetch_rows(&self, cursor: Option<&str>) -> Result<FetchBatch, ProviderError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<ApiRow>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Raw provider row; amounts arrive as decimal strings of whole won.
#[derive(Debug, Deserialize)]
struct ApiRow {
    bkcode: String,
    bkacctno: String,
    bkdate: String,
    bktime: String,
    #[serde(default)]
    bkjukyo: String,
    #[serde(default)]
    bkcontent: String,
    #[serde(default)]
    bketc: String,
    #[serde(default)]
    bkinput: String,
    #[serde(default)]
    bkoutput: String,
    #[serde(default)]
    bkjango: String,
    bkseq: i64,
}

fn parse_amount(field: &str, value: &str) -> Result<i64, ProviderError> {
    if value.is_empty() {
        return Ok(0);
    }
    value.parse::<i64>().map_err(|_| ProviderError::Api {
        code: "malformed_row".to_string(),
        message: format!("{} is not an integer amount: {:?}", field, value),
    })
}

fn require_digits(field: &str, value: &str, width: usize) -> Result<(), ProviderError> {
    if value.len() == width && value.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(());
    }
    Err(ProviderError::Api {
        code: "malformed_row".to_string(),
        message: format!("{} must be {} digits, got {:?}", field, width, value),
    })
}

impl TryFrom<ApiRow> for RawBankRow {
    type Error = ProviderError;

    fn try_from(row: ApiRow) -> Result<Self, ProviderError> {
        require_digits("bkdate", &row.bkdate, 8)?;
        require_digits("bktime", &row.bktime, 6)?;

        Ok(RawBankRow {
            credit_amount: parse_amount("bkinput", &row.bkinput)?,
            debit_amount: parse_amount("bkoutput", &row.bkoutput)?,
            balance: parse_amount("bkjango", &row.bkjango)?,
            bank_code: row.bkcode,
            account_number: row.bkacctno,
            bkdate: row.bkdate,
            bktime: row.bktime,
            bkjukyo: row.bkjukyo,
            bkcontent: row.bkcontent,
            bketc: row.bketc,
            sequence: row.bkseq,
        })
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpBankdaProvider {
    client: reqwest::Client,
    settings: ProviderConfig,
}

impl HttpBankdaProvider {
    pub fn new(settings: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client, settings })
    }
}

#[async_trait]
impl BankdaProvider for HttpBankdaProvider {
    #[instrument(skip(self), fields(account = %self.settings.account_number))]
    async fn fetch_rows(&self, cursor: Option<&str>) -> Result<FetchBatch, ProviderError> {
        let url = format!("{}/v2/deposits", self.settings.base_url);

        let mut query = vec![
            ("bank", self.settings.bank_code.as_str()),
            ("account", self.settings.account_number.as_str()),
        ];
        if let Some(cursor) = cursor {
            query.push(("after", cursor));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .query(&query)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !response.status().is_success() {
            let code = response.status().as_u16().to_string();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { code, message });
        }

        let envelope: ApiEnvelope = response.json().await.map_err(|e| ProviderError::Api {
            code: "malformed_response".to_string(),
            message: e.to_string(),
        })?;

        // Some provider errors arrive as a 200 with an error envelope.
        if let Some(code) = envelope.error_code {
            if code == "RATE_LIMIT" {
                return Err(ProviderError::RateLimited);
            }
            return Err(ProviderError::Api {
                code,
                message: envelope.error_message.unwrap_or_default(),
            });
        }

        let total = envelope.rows.len();
        let mut rows = Vec::with_capacity(total);
        for row in envelope.rows {
            let row = RawBankRow::try_from(row)?;
            // The deposit feed reconciles credit lines only.
            if row.credit_amount > 0 {
                rows.push(row);
            }
        }

        debug!(
            fetched = total,
            deposits = rows.len(),
            "Fetched provider rows"
        );

        Ok(FetchBatch {
            rows,
            next_cursor: envelope.next_cursor,
        })
    }
}
