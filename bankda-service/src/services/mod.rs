//! Service layer: storage, provider client, metrics, and the sync engine.

pub mod bankda;
pub mod database;
pub mod metrics;
pub mod sync;

pub use bankda::{BankdaProvider, FetchBatch, HttpBankdaProvider, ProviderError, RawBankRow};
pub use database::{CreditOutcome, Database};
pub use metrics::{get_metrics, init_metrics};
pub use sync::{CycleOutcome, SyncReport, SyncService};
