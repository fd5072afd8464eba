//! Error types for challenge issuance and validation

use thiserror::Error;

use super::horizon::AccountLookupError;
use super::jwt::JwtError;
use super::nonce::NonceStoreError;
use super::stellar_toml::DomainKeyError;
use super::transaction::TransactionError;

/// Structural violations found while validating a challenge transaction.
///
/// Each variant names the rule that failed; the first violation wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("could not parse challenge: {0}")]
    Transaction(#[from] TransactionError),

    #[error("challenge cannot be a fee bump transaction")]
    FeeBumpTransaction,

    #[error("challenge must be a v1 transaction envelope")]
    UnsupportedEnvelope,

    #[error("muxed accounts are not supported in challenge transactions")]
    MuxedAccount,

    #[error("transaction source account is not equal to server's account")]
    SourceAccountMismatch,

    #[error("transaction sequence number must be 0, got {0}")]
    InvalidSequenceNumber(i64),

    #[error("transaction requires non-infinite timebounds")]
    InfiniteTimeBounds,

    #[error(
        "transaction is not within range of the specified timebounds \
         (currentTime={now}, MinTime={min_time}, MaxTime={max_time})"
    )]
    OutsideTimeBounds {
        now: i64,
        min_time: u64,
        max_time: u64,
    },

    #[error("transaction requires at least one manage_data operation")]
    NoOperations,

    #[error("operation {0} type should be manage_data")]
    InvalidOperationType(usize),

    #[error("operation {0} should have a source account")]
    MissingOperationSource(usize),

    #[error("operation key does not match any homeDomains passed (key={key:?}, homeDomains={home_domains:?})")]
    HomeDomainMismatch {
        key: String,
        home_domains: Vec<String>,
    },

    #[error("invalid memo, only ID memos are permitted")]
    InvalidMemo,

    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("web auth domain operation must have server source account")]
    WebAuthDomainSource,

    #[error("web auth domain operation value is {got:?} but expect {expected:?}")]
    WebAuthDomainMismatch { got: String, expected: String },

    #[error("client_domain operation has invalid source account: {0}")]
    InvalidClientDomainSource(String),

    #[error("client_domain operation can appear at most once")]
    DuplicateClientDomain,

    #[error("unknown subsequent operation {0:?} must have server account as source")]
    UnknownOperationSource(String),

    #[error("client_domain manage_data operation is required")]
    ClientDomainRequired,

    #[error("transaction is not signed by server account {0}")]
    MissingServerSignature(String),
}

/// Error kinds, used to map a failure to a user-facing status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or disallowed request input
    Input,
    /// The challenge transaction violates a structural rule
    Structural,
    /// The client domain's stellar.toml could not be resolved
    DomainResolution,
    /// Transient failure while loading the account from the network
    LedgerLookup,
    /// Missing or insufficient signatures
    Cryptographic,
    /// Unknown, consumed or expired nonce
    Replay,
    Internal,
}

/// Errors returned by [`Sep10Service`](super::Sep10Service)
#[derive(Error, Debug)]
pub enum Sep10Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid home_domain {home_domain:?}, must match one of {allowed:?}")]
    InvalidHomeDomain {
        home_domain: String,
        allowed: Vec<String>,
    },

    #[error("reading challenge transaction: {0}")]
    InvalidChallenge(#[from] ChallengeError),

    #[error("fetching client domain signing key: {0}")]
    DomainKey(#[from] DomainKeyError),

    #[error(
        "client domain signing key {resolved} does not match client_domain operation source {operation_source}"
    )]
    ClientDomainKeyMismatch {
        resolved: String,
        operation_source: String,
    },

    #[error("fetching account from horizon: {0}")]
    AccountLookup(AccountLookupError),

    #[error(
        "there is more than one client signer on challenge transaction for an account that doesn't exist: \
         expected {expected} signatures, got {got}"
    )]
    SignatureCountMismatch { expected: usize, got: usize },

    #[error("transaction is not signed by client account {0}")]
    MissingClientSignature(String),

    #[error("transaction is not signed by client domain account {0}")]
    MissingClientDomainSignature(String),

    #[error("signatures do not meet threshold: got {got}, need {need}")]
    ThresholdNotMet { got: u32, need: u32 },

    #[error("nonce is invalid or expired")]
    NonceInvalid,

    #[error("nonce store error: {0}")]
    NonceStore(#[from] NonceStoreError),

    #[error("generating SEP10 JWT: {0}")]
    Token(#[from] JwtError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Sep10Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Sep10Error::InvalidRequest(_) | Sep10Error::InvalidHomeDomain { .. } => {
                ErrorKind::Input
            }
            Sep10Error::InvalidChallenge(ChallengeError::MissingServerSignature(_)) => {
                ErrorKind::Cryptographic
            }
            Sep10Error::InvalidChallenge(_) => ErrorKind::Structural,
            Sep10Error::DomainKey(_) => ErrorKind::DomainResolution,
            Sep10Error::AccountLookup(_) => ErrorKind::LedgerLookup,
            Sep10Error::ClientDomainKeyMismatch { .. }
            | Sep10Error::SignatureCountMismatch { .. }
            | Sep10Error::MissingClientSignature(_)
            | Sep10Error::MissingClientDomainSignature(_)
            | Sep10Error::ThresholdNotMet { .. } => ErrorKind::Cryptographic,
            Sep10Error::NonceInvalid => ErrorKind::Replay,
            Sep10Error::NonceStore(_) | Sep10Error::Token(_) | Sep10Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<TransactionError> for Sep10Error {
    fn from(e: TransactionError) -> Self {
        Sep10Error::Internal(e.to_string())
    }
}
