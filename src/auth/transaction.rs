//! Challenge transaction envelopes
//!
//! XDR encoding of transaction envelopes, network-scoped transaction hashes
//! and decorated signatures.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    DecoratedSignature, Hash, Limits, MuxedAccount, ReadXdr, Signature, SignatureHint,
    Transaction, TransactionEnvelope, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, WriteXdr,
};
use thiserror::Error;

use super::crypto::{encode_account_id, Keypair};

/// Upper bound on decoded envelope size; challenges are a few hundred bytes
const MAX_ENVELOPE_BYTES: usize = 64 * 1024;

const MAX_XDR_DEPTH: u32 = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Invalid base64 transaction: {0}")]
    InvalidBase64(String),

    #[error("Invalid transaction XDR: {0}")]
    InvalidXdr(String),

    #[error("Only v1 transaction envelopes can be signed")]
    UnsupportedEnvelope,
}

impl From<stellar_xdr::curr::Error> for TransactionError {
    fn from(e: stellar_xdr::curr::Error) -> Self {
        TransactionError::InvalidXdr(e.to_string())
    }
}

/// Decode a base64 XDR transaction envelope
pub fn decode_envelope(encoded: &str) -> Result<TransactionEnvelope, TransactionError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| TransactionError::InvalidBase64(e.to_string()))?;

    let limits = Limits {
        depth: MAX_XDR_DEPTH,
        len: MAX_ENVELOPE_BYTES,
    };

    Ok(TransactionEnvelope::from_xdr(bytes, limits)?)
}

/// Encode a transaction envelope as base64 XDR
pub fn encode_envelope(envelope: &TransactionEnvelope) -> Result<String, TransactionError> {
    let bytes = envelope.to_xdr(Limits::none())?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

/// SHA-256 of the network passphrase
pub fn network_id(network_passphrase: &str) -> Hash {
    Hash(Sha256::digest(network_passphrase.as_bytes()).into())
}

/// Hash of `tx` under the given network, the message every signer signs
pub fn transaction_hash(
    tx: &Transaction,
    network_passphrase: &str,
) -> Result<[u8; 32], TransactionError> {
    let payload = TransactionSignaturePayload {
        network_id: network_id(network_passphrase),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };

    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Append a decorated signature by `keypair` to a v1 envelope
pub fn sign_envelope(
    envelope: &mut TransactionEnvelope,
    network_passphrase: &str,
    keypair: &Keypair,
) -> Result<(), TransactionError> {
    let TransactionEnvelope::Tx(v1) = envelope else {
        return Err(TransactionError::UnsupportedEnvelope);
    };

    let hash = transaction_hash(&v1.tx, network_passphrase)?;
    let decorated = DecoratedSignature {
        hint: SignatureHint(keypair.signature_hint()),
        signature: Signature(keypair.sign(&hash).to_vec().try_into()?),
    };

    let mut signatures = v1.signatures.to_vec();
    signatures.push(decorated);
    v1.signatures = signatures.try_into()?;

    Ok(())
}

/// Raw signature bytes of each decorated signature
pub fn signature_bytes(signatures: &[DecoratedSignature]) -> Vec<&[u8]> {
    signatures
        .iter()
        .map(|decorated| decorated.signature.0.as_slice())
        .collect()
}

/// The `G...` address of an ed25519 account, `None` for muxed accounts
pub fn account_address(account: &MuxedAccount) -> Option<String> {
    match account {
        MuxedAccount::Ed25519(key) => Some(encode_account_id(&key.0)),
        MuxedAccount::MuxedEd25519(_) => None,
    }
}
