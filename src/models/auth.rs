//! Request/response models for SEP-10 web authentication

use serde::{Deserialize, Serialize};

use crate::auth::crypto::is_valid_account_id;
use crate::auth::Sep10Error;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request for an authentication challenge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChallengeRequest {
    pub account: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub home_domain: Option<String>,
    #[serde(default)]
    pub client_domain: Option<String>,
}

impl ChallengeRequest {
    /// Check the account and memo, returning the parsed ID memo if present
    pub fn validate(&self) -> Result<Option<u64>, Sep10Error> {
        if self.account.trim().is_empty() {
            return Err(Sep10Error::InvalidRequest(
                "account is required".to_string(),
            ));
        }

        if !is_valid_account_id(&self.account) {
            return Err(Sep10Error::InvalidRequest(
                "invalid account not a valid ed25519 public key".to_string(),
            ));
        }

        match non_blank(self.memo.as_deref()) {
            None => Ok(None),
            Some(memo) => memo.parse::<u64>().map(Some).map_err(|_| {
                Sep10Error::InvalidRequest(format!(
                    "invalid memo {:?}: expected an ID memo (unsigned 64-bit integer)",
                    memo
                ))
            }),
        }
    }

    /// Home domain with surrounding whitespace removed, `None` if blank
    pub fn home_domain(&self) -> Option<&str> {
        non_blank(self.home_domain.as_deref())
    }

    /// Client domain with surrounding whitespace removed, `None` if blank
    pub fn client_domain(&self) -> Option<&str> {
        non_blank(self.client_domain.as_deref())
    }
}

/// Response containing the authentication challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub transaction: String,
    pub network_passphrase: String,
}

/// Request to validate a signed challenge
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRequest {
    pub transaction: String,
}

impl ValidationRequest {
    pub fn validate(&self) -> Result<(), Sep10Error> {
        if self.transaction.trim().is_empty() {
            return Err(Sep10Error::InvalidRequest(
                "transaction is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Session token issued for a validated challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub token: String,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
