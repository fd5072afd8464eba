//! Stellar key encoding and ed25519 signatures
//!
//! Encodes and decodes strkey addresses (`G...`) and secret seeds (`S...`),
//! and signs/verifies ed25519 signatures over transaction hashes.

use std::fmt;

use base32::Alphabet;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

/// Version byte of an ed25519 account id (`G...`)
const VERSION_BYTE_ACCOUNT_ID: u8 = 6 << 3;

/// Version byte of an ed25519 secret seed (`S...`)
const VERSION_BYTE_SEED: u8 = 18 << 3;

/// 1 version byte + 32 key bytes + 2 checksum bytes, base32 without padding
const STRKEY_LEN: usize = 56;

/// Errors that can occur while decoding keys or verifying signatures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid Stellar key format: {0}")]
    InvalidAddressFormat(String),

    #[error("Invalid key version byte: expected {expected}, got {got}")]
    InvalidVersionByte { expected: u8, got: u8 },

    #[error("Invalid key checksum")]
    InvalidChecksum,

    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Decode a `G...` account id into its raw ed25519 public key
pub fn decode_account_id(address: &str) -> Result<[u8; 32], CryptoError> {
    decode_strkey(address, VERSION_BYTE_ACCOUNT_ID)
}

/// Decode an `S...` secret seed into its raw ed25519 seed
pub fn decode_secret_seed(seed: &str) -> Result<[u8; 32], CryptoError> {
    decode_strkey(seed, VERSION_BYTE_SEED)
}

pub fn encode_account_id(public_key: &[u8; 32]) -> String {
    encode_strkey(VERSION_BYTE_ACCOUNT_ID, public_key)
}

pub fn encode_secret_seed(seed: &[u8; 32]) -> String {
    encode_strkey(VERSION_BYTE_SEED, seed)
}

/// Whether `address` is a syntactically valid ed25519 account id
pub fn is_valid_account_id(address: &str) -> bool {
    decode_account_id(address).is_ok()
}

/// Verify an ed25519 signature made by `public_key` over `message`
pub fn verify_signature(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let signature = Signature::from_slice(signature)
        .map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Check whether any of `signatures` over `message` was made by `account_id`.
///
/// An undecodable account id never matches.
pub fn is_signed_by<'a>(
    account_id: &str,
    message: &[u8],
    signatures: impl IntoIterator<Item = &'a [u8]>,
) -> bool {
    let Ok(public_key) = decode_account_id(account_id) else {
        return false;
    };

    signatures
        .into_iter()
        .any(|signature| verify_signature(&public_key, message, signature).is_ok())
}

/// An ed25519 keypair addressed by its Stellar account id
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: String,
}

impl Keypair {
    /// Parse a keypair from an `S...` secret seed
    pub fn from_secret_seed(seed: &str) -> Result<Self, CryptoError> {
        let seed = decode_secret_seed(seed.trim())?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&seed)))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = encode_account_id(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Generate a fresh keypair from the OS random number generator
    pub fn random() -> Self {
        let seed: [u8; 32] = rand::random();
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    /// The `G...` account id of this keypair
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn secret_seed(&self) -> String {
        encode_secret_seed(&self.signing_key.to_bytes())
    }

    /// Last four bytes of the public key, used as the decorated signature hint
    pub fn signature_hint(&self) -> [u8; 4] {
        let public_key = self.public_key();
        [public_key[28], public_key[29], public_key[30], public_key[31]]
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Decode a strkey-encoded ed25519 key with the expected version byte.
///
/// Stellar keys are base32-encoded with a version byte prefix
/// and a 2-byte CRC16 checksum at the end.
fn decode_strkey(encoded: &str, version_byte: u8) -> Result<[u8; 32], CryptoError> {
    if encoded.len() != STRKEY_LEN {
        return Err(CryptoError::InvalidAddressFormat(format!(
            "Expected {} characters, got {}",
            STRKEY_LEN,
            encoded.len()
        )));
    }

    // Stellar only uses the upper-case RFC 4648 alphabet
    if !encoded
        .bytes()
        .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
    {
        return Err(CryptoError::InvalidAddressFormat(
            "Invalid base32 character".to_string(),
        ));
    }

    let decoded = base32::decode(Alphabet::Rfc4648 { padding: false }, encoded).ok_or_else(
        || CryptoError::InvalidAddressFormat("Invalid base32 encoding".to_string()),
    )?;

    if decoded.len() != 35 {
        return Err(CryptoError::InvalidAddressFormat(format!(
            "Expected 35 bytes, got {}",
            decoded.len()
        )));
    }

    if decoded[0] != version_byte {
        return Err(CryptoError::InvalidVersionByte {
            expected: version_byte,
            got: decoded[0],
        });
    }

    let payload = &decoded[..33];
    let checksum = &decoded[33..35];
    if checksum != crc16_xmodem(payload) {
        return Err(CryptoError::InvalidChecksum);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[1..33]);

    Ok(key)
}

fn encode_strkey(version_byte: u8, key: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(35);
    payload.push(version_byte);
    payload.extend_from_slice(key);
    let checksum = crc16_xmodem(&payload);
    payload.extend_from_slice(&checksum);

    base32::encode(Alphabet::Rfc4648 { padding: false }, &payload)
}

/// Calculate CRC16-XModem checksum (used by Stellar)
fn crc16_xmodem(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0;

    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }

    // Little-endian byte order
    [(crc & 0xff) as u8, (crc >> 8) as u8]
}
