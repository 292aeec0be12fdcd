use crate::upgrades::catalog::RawUpgrade;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameApiError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("could not decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("purchase of {upgrade_id} rejected: {reason}")]
    Rejected { upgrade_id: String, reason: String },
}

/// Account snapshot returned by a balance sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountBalance {
    pub balance_coins: i64,
    pub passive_per_hour: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PurchaseOutcome {
    pub success: bool,
    pub new_balance: Option<i64>,
}

#[async_trait]
pub trait GameApiClient: Send + Sync + 'static {
    async fn fetch_catalog(&self) -> Result<Vec<RawUpgrade>, GameApiError>;
    async fn purchase(&self, upgrade_id: &str) -> Result<PurchaseOutcome, GameApiError>;
    async fn fetch_balance(&self) -> Result<AccountBalance, GameApiError>;
}
