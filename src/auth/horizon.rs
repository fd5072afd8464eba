//! Account lookup through Horizon
//!
//! Loads an account's signers and thresholds. "Not found" is reported
//! separately from other failures because a missing account is a valid
//! login path, not an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountLookupError {
    #[error("account {0} does not exist on the network")]
    NotFound(String),

    #[error("horizon request failed: {0}")]
    Request(String),

    #[error("invalid horizon response: {0}")]
    InvalidResponse(String),
}

/// A signer of a ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSigner {
    pub key: String,
    pub weight: u32,
    #[serde(rename = "type", default)]
    pub signer_type: String,
}

/// Signature thresholds of a ledger account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub low_threshold: u8,
    pub med_threshold: u8,
    pub high_threshold: u8,
}

/// Read-only view of a ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub signers: Vec<AccountSigner>,
    pub thresholds: Thresholds,
}

/// Resolves an account's current signers and thresholds
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn get(&self, account_id: &str) -> Result<Account, AccountLookupError>;
}

/// [`AccountLookup`] backed by the Horizon REST API
#[derive(Clone)]
pub struct HorizonClient {
    horizon_url: String,
    client: Client,
}

impl HorizonClient {
    pub fn new(horizon_url: String, timeout: Duration) -> Self {
        Self {
            horizon_url: horizon_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn account_url(&self, account_id: &str) -> String {
        format!("{}/accounts/{}", self.horizon_url, account_id)
    }
}

#[async_trait]
impl AccountLookup for HorizonClient {
    async fn get(&self, account_id: &str) -> Result<Account, AccountLookupError> {
        let response = self
            .client
            .get(self.account_url(account_id))
            .send()
            .await
            .map_err(|e| AccountLookupError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(AccountLookupError::NotFound(account_id.to_string()))
            }
            status if !status.is_success() => {
                return Err(AccountLookupError::Request(format!(
                    "loading account {} returned status {}",
                    account_id, status
                )))
            }
            _ => {}
        }

        let account: Account = response
            .json()
            .await
            .map_err(|e| AccountLookupError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            account = %account.account_id,
            signers = account.signers.len(),
            med_threshold = account.thresholds.med_threshold,
            "Loaded account from horizon"
        );

        Ok(account)
    }
}
