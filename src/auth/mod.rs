//! SEP-10 web authentication
//!
//! Challenge-response login proving control of a Stellar account:
//! - challenge transactions carrying a single-use nonce
//! - structural, signature and threshold validation of signed challenges
//! - session tokens for validated challenges

pub mod challenge;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod horizon;
pub mod jwt;
pub mod nonce;
pub mod signatures;
pub mod stellar_toml;
pub mod transaction;
pub mod validator;

mod service;

pub use challenge::{generate_nonce, ChallengeBuilder, ChallengeParams, ClientDomain};
pub use crypto::Keypair;
pub use domain::TenantContext;
pub use error::{ChallengeError, ErrorKind, Sep10Error};
pub use horizon::{Account, AccountLookup, AccountLookupError, AccountSigner, HorizonClient, Thresholds};
pub use jwt::{JwtError, JwtManager, Sep10Claims, TokenSigner};
pub use nonce::{spawn_nonce_sweeper, InMemoryNonceStore, NonceStore, NonceStoreError, PostgresNonceStore};
pub use service::{Sep10Collaborators, Sep10Service};
pub use stellar_toml::{DomainKeyError, DomainKeyResolver, StellarTomlResolver};
pub use validator::{ChallengeValidationResult, ChallengeValidator};
