//! Configuration module for bankda-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BankdaConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// External bank-data provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub bank_code: String,
    pub account_number: String,
    pub timeout_secs: u64,
}

/// Recurring sync scheduling. `interval_secs = 0` disables the scheduler;
/// cycles can still be triggered through the sync endpoint.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval_secs: u64,
}

impl BankdaConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "bankda-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            provider: ProviderConfig {
                base_url: env::var("BANKDA_BASE_URL")
                    .unwrap_or_else(|_| "https://api.bankda.com".to_string()),
                api_key: env::var("BANKDA_API_KEY").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("BANKDA_API_KEY is required"))
                })?,
                bank_code: env::var("BANKDA_BANK_CODE").unwrap_or_else(|_| "004".to_string()),
                account_number: env::var("BANKDA_ACCOUNT_NUMBER").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("BANKDA_ACCOUNT_NUMBER is required"))
                })?,
                timeout_secs: env::var("BANKDA_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            },
            sync: SyncConfig {
                interval_secs: env::var("SYNC_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            },
        })
    }
}
