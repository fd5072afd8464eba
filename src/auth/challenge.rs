//! Challenge transaction construction
//!
//! A challenge is a never-submitted transaction with sequence number 0,
//! sourced by the server account and signed by it. Its first operation
//! carries the nonce for the client account; the following ones bind the
//! web-auth domain and, optionally, the client domain.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use stellar_xdr::curr::{
    ManageDataOp, Memo, MuxedAccount, Operation, OperationBody, Preconditions, SequenceNumber,
    TimeBounds, TimePoint, Transaction, TransactionEnvelope, TransactionExt,
    TransactionV1Envelope, Uint256, VecM,
};

use super::crypto::{decode_account_id, Keypair};
use super::error::Sep10Error;
use super::stellar_toml::DomainKeyError;
use super::transaction::{sign_envelope, TransactionError};

/// Raw nonce length in bytes
pub const NONCE_RAW_LEN: usize = 48;

/// Length of the base64-encoded nonce
pub const NONCE_ENCODED_LEN: usize = 64;

pub const WEB_AUTH_DOMAIN_KEY: &str = "web_auth_domain";
pub const CLIENT_DOMAIN_KEY: &str = "client_domain";

/// Minimum base fee per operation, in stroops
const BASE_FEE: u32 = 100;

/// Key of the first (nonce) operation for `home_domain`
pub fn auth_key(home_domain: &str) -> String {
    format!("{} auth", home_domain)
}

/// Generate a fresh base64-encoded 48-byte nonce
pub fn generate_nonce() -> Result<String, Sep10Error> {
    let mut raw = [0u8; NONCE_RAW_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| Sep10Error::Internal(format!("reading random bytes: {}", e)))?;

    let nonce = general_purpose::STANDARD.encode(raw);
    if nonce.len() != NONCE_ENCODED_LEN {
        return Err(Sep10Error::Internal(
            "64 byte long random nonce required".to_string(),
        ));
    }

    Ok(nonce)
}

/// A client domain and the signing key it attested to
#[derive(Debug, Clone, Copy)]
pub struct ClientDomain<'a> {
    pub domain: &'a str,
    pub signing_key: &'a str,
}

/// Inputs of one challenge transaction
#[derive(Debug, Clone, Copy)]
pub struct ChallengeParams<'a> {
    pub client_account: &'a str,
    pub home_domain: &'a str,
    pub web_auth_domain: &'a str,
    pub nonce: &'a str,
    pub memo: Option<u64>,
    pub client_domain: Option<ClientDomain<'a>>,
}

/// Builds server-signed challenge transactions
#[derive(Debug, Clone)]
pub struct ChallengeBuilder {
    server_keypair: Arc<Keypair>,
    network_passphrase: String,
    auth_timeout: Duration,
}

impl ChallengeBuilder {
    pub fn new(
        server_keypair: Arc<Keypair>,
        network_passphrase: String,
        auth_timeout: Duration,
    ) -> Result<Self, Sep10Error> {
        if auth_timeout < Duration::from_secs(1) {
            return Err(Sep10Error::Internal(
                "provided timebound must be at least 1s (300s is recommended)".to_string(),
            ));
        }

        Ok(Self {
            server_keypair,
            network_passphrase,
            auth_timeout,
        })
    }

    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    /// Build and server-sign a challenge valid for `[now, now + auth_timeout]`
    pub fn build(
        &self,
        params: &ChallengeParams<'_>,
        now: DateTime<Utc>,
    ) -> Result<TransactionEnvelope, Sep10Error> {
        if params.nonce.len() != NONCE_ENCODED_LEN {
            return Err(Sep10Error::Internal(
                "64 byte long random nonce required".to_string(),
            ));
        }

        let client_key = decode_account_id(params.client_account).map_err(|_| {
            Sep10Error::InvalidRequest(format!(
                "{} is not a valid account id",
                params.client_account
            ))
        })?;

        let server_key = self.server_keypair.public_key();

        let mut operations = vec![
            manage_data(
                client_key,
                &auth_key(params.home_domain),
                params.nonce.as_bytes(),
            )?,
            manage_data(
                server_key,
                WEB_AUTH_DOMAIN_KEY,
                params.web_auth_domain.as_bytes(),
            )?,
        ];

        if let Some(client_domain) = params.client_domain {
            let client_domain_key = decode_account_id(client_domain.signing_key).map_err(|_| {
                DomainKeyError::InvalidSigningKey(client_domain.signing_key.to_string())
            })?;
            operations.push(manage_data(
                client_domain_key,
                CLIENT_DOMAIN_KEY,
                client_domain.domain.as_bytes(),
            )?);
        }

        let min_time = now.timestamp().max(0) as u64;
        let max_time = min_time + self.auth_timeout.as_secs();

        let tx = Transaction {
            source_account: MuxedAccount::Ed25519(Uint256(server_key)),
            fee: BASE_FEE * operations.len() as u32,
            seq_num: SequenceNumber(0),
            cond: Preconditions::Time(TimeBounds {
                min_time: TimePoint(min_time),
                max_time: TimePoint(max_time),
            }),
            memo: params.memo.map_or(Memo::None, Memo::Id),
            operations: operations.try_into().map_err(TransactionError::from)?,
            ext: TransactionExt::V0,
        };

        let mut envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx,
            signatures: VecM::default(),
        });
        sign_envelope(&mut envelope, &self.network_passphrase, &self.server_keypair)?;

        Ok(envelope)
    }
}

fn manage_data(source: [u8; 32], name: &str, value: &[u8]) -> Result<Operation, TransactionError> {
    Ok(Operation {
        source_account: Some(MuxedAccount::Ed25519(Uint256(source))),
        body: OperationBody::ManageData(ManageDataOp {
            data_name: name.as_bytes().to_vec().try_into()?,
            data_value: Some(value.to_vec().try_into()?),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::is_signed_by;
    use crate::auth::transaction::{signature_bytes, transaction_hash};

    const TEST_PASSPHRASE: &str = "Test SDF Network ; September 2015";

    fn builder(server: &Keypair) -> ChallengeBuilder {
        ChallengeBuilder::new(
            Arc::new(server.clone()),
            TEST_PASSPHRASE.to_string(),
            Duration::from_secs(900),
        )
        .unwrap()
    }

    fn unwrap_v1(envelope: TransactionEnvelope) -> TransactionV1Envelope {
        match envelope {
            TransactionEnvelope::Tx(v1) => v1,
            _ => panic!("expected a v1 envelope"),
        }
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce().unwrap();
        assert_eq!(nonce.len(), NONCE_ENCODED_LEN);
        let raw = general_purpose::STANDARD.decode(&nonce).unwrap();
        assert_eq!(raw.len(), NONCE_RAW_LEN);
        assert_ne!(nonce, generate_nonce().unwrap());
    }

    #[test]
    fn test_build_challenge() {
        let server = Keypair::random();
        let client = Keypair::random();
        let client_domain_key = Keypair::random();
        let nonce = generate_nonce().unwrap();
        let now = Utc::now();

        let envelope = builder(&server)
            .build(
                &ChallengeParams {
                    client_account: client.address(),
                    home_domain: "sdp.example.com",
                    web_auth_domain: "sdp.example.com",
                    nonce: &nonce,
                    memo: Some(42),
                    client_domain: Some(ClientDomain {
                        domain: "chaos.cadia.com",
                        signing_key: client_domain_key.address(),
                    }),
                },
                now,
            )
            .unwrap();

        let v1 = unwrap_v1(envelope);
        let tx = &v1.tx;
        assert_eq!(tx.seq_num, SequenceNumber(0));
        assert_eq!(tx.memo, Memo::Id(42));
        assert_eq!(tx.fee, 300);
        assert_eq!(tx.operations.len(), 3);
        assert_eq!(
            tx.source_account,
            MuxedAccount::Ed25519(Uint256(server.public_key()))
        );

        match &tx.cond {
            Preconditions::Time(bounds) => {
                assert_eq!(bounds.min_time.0, now.timestamp() as u64);
                assert_eq!(bounds.max_time.0, now.timestamp() as u64 + 900);
            }
            other => panic!("unexpected preconditions {:?}", other),
        }

        let OperationBody::ManageData(first) = &tx.operations[0].body else {
            panic!("expected manage_data");
        };
        assert_eq!(
            tx.operations[0].source_account,
            Some(MuxedAccount::Ed25519(Uint256(client.public_key())))
        );
        assert_eq!(
            first.data_name.as_slice(),
            b"sdp.example.com auth".as_slice()
        );

        let OperationBody::ManageData(third) = &tx.operations[2].body else {
            panic!("expected manage_data");
        };
        assert_eq!(third.data_name.as_slice(), CLIENT_DOMAIN_KEY.as_bytes());
        assert_eq!(
            tx.operations[2].source_account,
            Some(MuxedAccount::Ed25519(Uint256(client_domain_key.public_key())))
        );

        let hash = transaction_hash(tx, TEST_PASSPHRASE).unwrap();
        assert_eq!(v1.signatures.len(), 1);
        assert!(is_signed_by(
            server.address(),
            &hash,
            signature_bytes(&v1.signatures)
        ));
    }

    #[test]
    fn test_build_without_client_domain_or_memo() {
        let server = Keypair::random();
        let client = Keypair::random();
        let nonce = generate_nonce().unwrap();

        let v1 = unwrap_v1(
            builder(&server)
                .build(
                    &ChallengeParams {
                        client_account: client.address(),
                        home_domain: "sdp.example.com",
                        web_auth_domain: "bluecorp.sdp.example.com",
                        nonce: &nonce,
                        memo: None,
                        client_domain: None,
                    },
                    Utc::now(),
                )
                .unwrap(),
        );

        assert_eq!(v1.tx.operations.len(), 2);
        assert_eq!(v1.tx.memo, Memo::None);
    }

    #[test]
    fn test_build_rejects_invalid_client_account() {
        let server = Keypair::random();
        let nonce = generate_nonce().unwrap();

        let result = builder(&server).build(
            &ChallengeParams {
                client_account: "GINVALID",
                home_domain: "sdp.example.com",
                web_auth_domain: "sdp.example.com",
                nonce: &nonce,
                memo: None,
                client_domain: None,
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(Sep10Error::InvalidRequest(_))));
    }

    #[test]
    fn test_auth_timeout_must_be_at_least_one_second() {
        let result = ChallengeBuilder::new(
            Arc::new(Keypair::random()),
            TEST_PASSPHRASE.to_string(),
            Duration::from_millis(500),
        );
        assert!(result.is_err());
    }
}
