//! Common test utilities for bankda-service integration tests.

use async_trait::async_trait;
use bankda_service::config::{BankdaConfig, DatabaseConfig, ProviderConfig, SyncConfig};
use bankda_service::services::{BankdaProvider, Database, FetchBatch, ProviderError, RawBankRow};
use bankda_service::startup::Application;
use service_core::config::Config as CommonConfig;
use std::collections::VecDeque;
use std::sync::{Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,bankda_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// One scripted provider response.
pub enum ScriptedFetch {
    Batch(FetchBatch),
    RateLimited,
    Fail(String),
}

/// Provider double with scripted responses. An exhausted script returns
/// empty batches; received cursors are recorded for assertions.
#[derive(Default)]
pub struct StubProvider {
    script: Mutex<VecDeque<ScriptedFetch>>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl StubProvider {
    pub fn push(&self, fetch: ScriptedFetch) {
        self.script.lock().unwrap().push_back(fetch);
    }

    pub fn push_rows(&self, rows: Vec<RawBankRow>, next_cursor: Option<&str>) {
        self.push(ScriptedFetch::Batch(FetchBatch {
            rows,
            next_cursor: next_cursor.map(|c| c.to_string()),
        }));
    }

    pub fn seen_cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl BankdaProvider for StubProvider {
    async fn fetch_rows(&self, cursor: Option<&str>) -> Result<FetchBatch, ProviderError> {
        self.cursors
            .lock()
            .unwrap()
            .push(cursor.map(|c| c.to_string()));

        match self.script.lock().unwrap().pop_front() {
            Some(ScriptedFetch::Batch(batch)) => Ok(batch),
            Some(ScriptedFetch::RateLimited) => Err(ProviderError::RateLimited),
            Some(ScriptedFetch::Fail(message)) => Err(ProviderError::Api {
                code: "500".to_string(),
                message,
            }),
            None => Ok(FetchBatch::default()),
        }
    }
}

fn test_config(account_number: &str) -> BankdaConfig {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests");

    BankdaConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "bankda-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
            min_connections: 1,
        },
        provider: ProviderConfig {
            base_url: "http://127.0.0.1:0".to_string(),
            api_key: "test-key".to_string(),
            bank_code: "004".to_string(),
            account_number: account_number.to_string(),
            timeout_secs: 5,
        },
        sync: SyncConfig { interval_secs: 0 },
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub db: Database,
    pub provider: std::sync::Arc<StubProvider>,
    /// Unique per app; statement rows built with `deposit_row` use it so
    /// identity keys never collide across tests sharing one database.
    pub account: String,
}

/// Spawn a test application wired to a scripted provider.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let account = format!("9{:011}", rand_suffix());
    let provider = std::sync::Arc::new(StubProvider::default());
    let config = test_config(&account);

    let app = Application::build_with_provider(config, provider.clone())
        .await
        .expect("Failed to build application");

    let port = app.port();
    let db = app.db().clone();

    // Start the application in the background
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let address = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    // Wait for the server to be ready with retry
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", address)).send().await {
            Ok(response) if response.status().is_success() => break,
            _ if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
            Ok(response) => panic!("Health check kept failing: {}", response.status()),
            Err(e) => panic!("Failed to reach test app after 20 attempts: {}", e),
        }
    }

    TestApp {
        address,
        client,
        db,
        provider,
        account,
    }
}

fn rand_suffix() -> u64 {
    let bytes = Uuid::new_v4().into_bytes();
    u64::from_be_bytes(bytes[..8].try_into().unwrap()) % 100_000_000_000
}

/// Today's bkdate in the provider's fixed-width form.
pub fn today_bkdate() -> String {
    chrono::Utc::now().format("%Y%m%d").to_string()
}

/// A unique member/depositor name so concurrent tests never collide in the
/// shared member directory.
pub fn unique_name(base: &str) -> String {
    format!("{}-{}", base, &Uuid::new_v4().simple().to_string()[..8])
}

#[allow(dead_code)]
impl TestApp {
    /// Build a deposit row for this app's account.
    pub fn deposit_row(&self, bkjukyo: &str, amount: i64, sequence: i64) -> RawBankRow {
        RawBankRow {
            bank_code: "004".to_string(),
            account_number: self.account.clone(),
            bkdate: today_bkdate(),
            bktime: format!("{:06}", 90000 + sequence),
            bkjukyo: bkjukyo.to_string(),
            bkcontent: "인터넷입금".to_string(),
            bketc: String::new(),
            credit_amount: amount,
            debit_amount: 0,
            balance: 0,
            sequence,
        }
    }

    pub async fn post_sync(&self) -> serde_json::Value {
        self.client
            .post(format!("{}/api/admin/bankda/sync", self.address))
            .send()
            .await
            .expect("Failed to trigger sync")
            .json()
            .await
            .expect("Sync response was not JSON")
    }

    pub async fn get_summary(&self) -> serde_json::Value {
        self.client
            .get(format!("{}/api/admin/bankda/summary", self.address))
            .send()
            .await
            .expect("Failed to get summary")
            .json()
            .await
            .expect("Summary response was not JSON")
    }

    pub async fn list_transactions(&self, query: &str) -> serde_json::Value {
        self.client
            .get(format!(
                "{}/api/admin/bankda/transactions{}",
                self.address, query
            ))
            .send()
            .await
            .expect("Failed to list transactions")
            .json()
            .await
            .expect("Transaction list was not JSON")
    }

    pub async fn search_members(&self, q: &str) -> reqwest::Response {
        self.client
            .get(format!(
                "{}/api/admin/bankda/search-members",
                self.address
            ))
            .query(&[("q", q)])
            .send()
            .await
            .expect("Failed to search members")
    }

    pub async fn manual_match(&self, transaction_id: Uuid, member_id: Uuid) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/api/admin/bankda/transactions/{}/manual-match",
                self.address, transaction_id
            ))
            .json(&serde_json::json!({ "memberId": member_id }))
            .send()
            .await
            .expect("Failed to post manual match")
    }

    pub async fn ignore(&self, transaction_id: Uuid, memo: &str) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/api/admin/bankda/transactions/{}/ignore",
                self.address, transaction_id
            ))
            .json(&serde_json::json!({ "memo": memo }))
            .send()
            .await
            .expect("Failed to post ignore")
    }

    /// Insert a member directly; the directory is an external store in
    /// production.
    pub async fn insert_member(&self, member_name: &str) -> Uuid {
        self.insert_member_full(member_name, "", "").await
    }

    pub async fn insert_member_full(
        &self,
        member_name: &str,
        company_name: &str,
        phone: &str,
    ) -> Uuid {
        let member_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO members (member_id, member_name, company_name, phone) VALUES ($1, $2, $3, $4)",
        )
        .bind(member_id)
        .bind(member_name)
        .bind(company_name)
        .bind(phone)
        .execute(self.db.pool())
        .await
        .expect("Failed to insert member");
        member_id
    }

    pub async fn member_deposit(&self, member_id: Uuid) -> i64 {
        let member = self
            .db
            .get_member(member_id)
            .await
            .expect("Failed to load member")
            .expect("Member not found");
        member.deposit
    }

    /// Insert a ledger row directly in a given status, bypassing the sync
    /// pipeline, for crediting and manual-resolution setups.
    pub async fn insert_transaction(
        &self,
        status: &str,
        bkjukyo: &str,
        amount: i64,
        member_id: Option<Uuid>,
    ) -> Uuid {
        let transaction_id = Uuid::new_v4();
        let identity_key = format!("{}-{}", self.account, Uuid::new_v4().simple());
        sqlx::query(
            r#"
            INSERT INTO bank_transactions
                (transaction_id, identity_key, bank_code, account_number, bkdate, bktime,
                 bkjukyo, credit_amount, match_status, matched_member_id)
            VALUES ($1, $2, '004', $3, $4, '120000', $5, $6, $7, $8)
            "#,
        )
        .bind(transaction_id)
        .bind(identity_key)
        .bind(&self.account)
        .bind(today_bkdate())
        .bind(bkjukyo)
        .bind(amount)
        .bind(status)
        .bind(member_id)
        .execute(self.db.pool())
        .await
        .expect("Failed to insert transaction");
        transaction_id
    }

    /// Ledger rows for this app's account only, newest first.
    pub async fn account_transactions(&self) -> Vec<serde_json::Value> {
        let all = self.list_transactions("").await;
        all.as_array()
            .expect("Transaction list was not an array")
            .iter()
            .filter(|t| t["accountNumber"] == serde_json::json!(self.account))
            .cloned()
            .collect()
    }
}
