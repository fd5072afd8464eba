//! Structural validation of signed challenge transactions
//!
//! Checks run in a fixed order and the first violated rule is returned as a
//! [`ChallengeError`]. Nothing here touches the network or the nonce store.

use base64::{engine::general_purpose, Engine as _};
use stellar_xdr::curr::{
    DecoratedSignature, ManageDataOp, Memo, MuxedAccount, Operation, OperationBody,
    Preconditions, TimeBounds, Transaction, TransactionEnvelope,
};

use super::challenge::{
    auth_key, CLIENT_DOMAIN_KEY, NONCE_ENCODED_LEN, NONCE_RAW_LEN, WEB_AUTH_DOMAIN_KEY,
};
use super::crypto::{is_signed_by, is_valid_account_id};
use super::error::ChallengeError;
use super::transaction::{account_address, decode_envelope, signature_bytes, transaction_hash};

/// Tolerated clock skew before the challenge's `min_time`, in seconds
pub const GRACE_PERIOD_SECONDS: i64 = 5 * 60;

/// A structurally valid challenge and the values extracted from it
#[derive(Debug, Clone)]
pub struct ChallengeValidationResult {
    pub transaction: Transaction,
    pub signatures: Vec<DecoratedSignature>,
    /// Network-scoped transaction hash, the message every signer signed
    pub hash: [u8; 32],
    pub client_account_id: String,
    pub home_domain: String,
    pub memo: Option<u64>,
    pub client_domain: Option<String>,
    /// Source account of the `client_domain` operation
    pub client_domain_account: Option<String>,
    pub nonce: String,
}

impl ChallengeValidationResult {
    /// Start of the challenge's time bounds
    pub fn min_time(&self) -> u64 {
        time_bounds(&self.transaction.cond)
            .map(|bounds| bounds.min_time.0)
            .unwrap_or_default()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn signature_bytes(&self) -> Vec<&[u8]> {
        signature_bytes(&self.signatures)
    }
}

/// Validates challenges issued by one server account on one network
#[derive(Debug, Clone)]
pub struct ChallengeValidator {
    server_account: String,
    network_passphrase: String,
    client_attribution_required: bool,
}

impl ChallengeValidator {
    pub fn new(
        server_account: String,
        network_passphrase: String,
        client_attribution_required: bool,
    ) -> Self {
        Self {
            server_account,
            network_passphrase,
            client_attribution_required,
        }
    }

    pub fn server_account(&self) -> &str {
        &self.server_account
    }

    /// Validate a base64 XDR challenge at Unix time `now`
    pub fn validate(
        &self,
        transaction: &str,
        web_auth_domain: &str,
        home_domains: &[String],
        now: i64,
    ) -> Result<ChallengeValidationResult, ChallengeError> {
        let envelope = decode_envelope(transaction)?;
        let v1 = match envelope {
            TransactionEnvelope::Tx(v1) => v1,
            TransactionEnvelope::TxFeeBump(_) => return Err(ChallengeError::FeeBumpTransaction),
            TransactionEnvelope::TxV0(_) => return Err(ChallengeError::UnsupportedEnvelope),
        };
        let tx = v1.tx;
        let signatures = v1.signatures.to_vec();

        let source = account_address(&tx.source_account).ok_or(ChallengeError::MuxedAccount)?;
        if source != self.server_account {
            return Err(ChallengeError::SourceAccountMismatch);
        }

        if tx.seq_num.0 != 0 {
            return Err(ChallengeError::InvalidSequenceNumber(tx.seq_num.0));
        }

        let bounds = time_bounds(&tx.cond).ok_or(ChallengeError::InfiniteTimeBounds)?;
        let (min_time, max_time) = (bounds.min_time.0, bounds.max_time.0);
        if max_time == 0 {
            return Err(ChallengeError::InfiniteTimeBounds);
        }
        // Saturate so hostile u64 bounds can't wrap the comparison
        let min_allowed = i64::try_from(min_time).unwrap_or(i64::MAX);
        let max_allowed = i64::try_from(max_time).unwrap_or(i64::MAX);
        if now.saturating_add(GRACE_PERIOD_SECONDS) < min_allowed || now > max_allowed {
            return Err(ChallengeError::OutsideTimeBounds {
                now,
                min_time,
                max_time,
            });
        }

        let first = tx.operations.first().ok_or(ChallengeError::NoOperations)?;
        let (first_source, first_op) = manage_data_with_source(first, 0)?;

        let key = data_name(first_op);
        let home_domain = home_domains
            .iter()
            .find(|domain| auth_key(domain) == key)
            .cloned()
            .ok_or_else(|| ChallengeError::HomeDomainMismatch {
                key: key.clone(),
                home_domains: home_domains.to_vec(),
            })?;

        let memo = match tx.memo {
            Memo::None => None,
            Memo::Id(id) => Some(id),
            _ => return Err(ChallengeError::InvalidMemo),
        };

        let nonce = validate_nonce(first_op)?;

        let mut client_domain = None;
        for (index, operation) in tx.operations.iter().enumerate().skip(1) {
            let (op_source, op) = manage_data_with_source(operation, index)?;

            match data_name(op).as_str() {
                WEB_AUTH_DOMAIN_KEY => {
                    if op_source != self.server_account {
                        return Err(ChallengeError::WebAuthDomainSource);
                    }
                    let value = data_value(op);
                    if value != web_auth_domain.as_bytes() {
                        return Err(ChallengeError::WebAuthDomainMismatch {
                            got: String::from_utf8_lossy(value).into_owned(),
                            expected: web_auth_domain.to_string(),
                        });
                    }
                }
                CLIENT_DOMAIN_KEY => {
                    if client_domain.is_some() {
                        return Err(ChallengeError::DuplicateClientDomain);
                    }
                    if !is_valid_account_id(&op_source) {
                        return Err(ChallengeError::InvalidClientDomainSource(op_source));
                    }
                    let domain = String::from_utf8_lossy(data_value(op)).into_owned();
                    client_domain = Some((domain, op_source));
                }
                other => {
                    if op_source != self.server_account {
                        return Err(ChallengeError::UnknownOperationSource(other.to_string()));
                    }
                }
            }
        }

        if self.client_attribution_required && client_domain.is_none() {
            return Err(ChallengeError::ClientDomainRequired);
        }

        let hash = transaction_hash(&tx, &self.network_passphrase)?;
        if !is_signed_by(&self.server_account, &hash, signature_bytes(&signatures)) {
            return Err(ChallengeError::MissingServerSignature(
                self.server_account.clone(),
            ));
        }

        let (client_domain, client_domain_account) = client_domain.unzip();

        Ok(ChallengeValidationResult {
            transaction: tx,
            signatures,
            hash,
            client_account_id: first_source,
            home_domain,
            memo,
            client_domain,
            client_domain_account,
            nonce,
        })
    }
}

/// Finite or not, the time bounds carried by the preconditions
fn time_bounds(cond: &Preconditions) -> Option<&TimeBounds> {
    match cond {
        Preconditions::None => None,
        Preconditions::Time(bounds) => Some(bounds),
        Preconditions::V2(v2) => v2.time_bounds.as_ref(),
    }
}

/// The manage_data body of `operation` and its G-address source
fn manage_data_with_source(
    operation: &Operation,
    index: usize,
) -> Result<(String, &ManageDataOp), ChallengeError> {
    let OperationBody::ManageData(op) = &operation.body else {
        return Err(ChallengeError::InvalidOperationType(index));
    };

    let source = match &operation.source_account {
        None => return Err(ChallengeError::MissingOperationSource(index)),
        Some(account @ MuxedAccount::Ed25519(_)) => account_address(account),
        Some(MuxedAccount::MuxedEd25519(_)) => None,
    }
    .ok_or(ChallengeError::MuxedAccount)?;

    Ok((source, op))
}

fn data_name(op: &ManageDataOp) -> String {
    String::from_utf8_lossy(op.data_name.as_slice()).into_owned()
}

fn data_value(op: &ManageDataOp) -> &[u8] {
    op.data_value
        .as_ref()
        .map(|value| value.as_slice())
        .unwrap_or_default()
}

fn validate_nonce(op: &ManageDataOp) -> Result<String, ChallengeError> {
    let value = data_value(op);
    if value.len() != NONCE_ENCODED_LEN {
        return Err(ChallengeError::InvalidNonce(
            "random nonce encoded as base64 should be 64 bytes long".to_string(),
        ));
    }

    let raw = general_purpose::STANDARD.decode(value).map_err(|e| {
        ChallengeError::InvalidNonce(format!(
            "failed to decode random nonce provided in manage_data operation: {}",
            e
        ))
    })?;
    if raw.len() != NONCE_RAW_LEN {
        return Err(ChallengeError::InvalidNonce(
            "random nonce before encoding as base64 should be 48 bytes long".to_string(),
        ));
    }

    String::from_utf8(value.to_vec())
        .map_err(|e| ChallengeError::InvalidNonce(e.to_string()))
}
