//! Client signature verification
//!
//! Runs after structural validation, once the client account has been looked
//! up on the network. Accounts that don't exist yet can only be signed for by
//! their master key; existing accounts must reach their medium threshold.

use super::crypto::{decode_account_id, is_signed_by, verify_signature};
use super::error::Sep10Error;
use super::horizon::Account;
use super::validator::ChallengeValidationResult;

/// Verify a challenge for an account that is not on the ledger yet.
///
/// The envelope must carry exactly the server and client signatures, plus
/// one for the client domain key when a `client_domain` operation is present.
pub fn verify_non_existent_account(
    result: &ChallengeValidationResult,
    client_domain_key: Option<&str>,
) -> Result<(), Sep10Error> {
    let expected = if result.client_domain.is_some() { 3 } else { 2 };
    let got = result.signatures.len();
    if got != expected {
        return Err(Sep10Error::SignatureCountMismatch { expected, got });
    }

    if !is_signed_by(
        &result.client_account_id,
        &result.hash,
        result.signature_bytes(),
    ) {
        return Err(Sep10Error::MissingClientSignature(
            result.client_account_id.clone(),
        ));
    }

    verify_client_domain_signature(result, client_domain_key)
}

/// Verify a challenge for an existing account against its medium threshold.
///
/// Returns the total weight of the matched signers.
pub fn verify_threshold(
    result: &ChallengeValidationResult,
    account: &Account,
    client_domain_key: Option<&str>,
) -> Result<u32, Sep10Error> {
    verify_client_domain_signature(result, client_domain_key)?;

    let need = u32::from(account.thresholds.med_threshold);
    let got = signer_weight(result, account);

    // A zero threshold still needs one of the account's own signers
    if got == 0 || got < need {
        return Err(Sep10Error::ThresholdNotMet { got, need });
    }

    tracing::debug!(
        account = %result.client_account_id,
        weight = got,
        med_threshold = need,
        "Signature threshold met"
    );

    Ok(got)
}

/// Sum of the weights of account signers that signed the challenge.
///
/// Each signer contributes at most once, however many of the envelope's
/// signatures it produced.
pub fn signer_weight(result: &ChallengeValidationResult, account: &Account) -> u32 {
    // Non-ed25519 signers (hash-x, pre-auth tx) never sign a challenge
    let signers: Vec<([u8; 32], u32)> = account
        .signers
        .iter()
        .filter(|signer| signer.weight > 0)
        .filter_map(|signer| {
            decode_account_id(&signer.key)
                .ok()
                .map(|key| (key, signer.weight))
        })
        .collect();

    let mut consumed = vec![false; signers.len()];
    let mut total: u32 = 0;

    for signature in result.signature_bytes() {
        for (index, (key, weight)) in signers.iter().enumerate() {
            if consumed[index] {
                continue;
            }
            if verify_signature(key, &result.hash, signature).is_ok() {
                consumed[index] = true;
                total = total.saturating_add(*weight);
                break;
            }
        }
    }

    total
}

fn verify_client_domain_signature(
    result: &ChallengeValidationResult,
    client_domain_key: Option<&str>,
) -> Result<(), Sep10Error> {
    let Some(key) = client_domain_key else {
        return Ok(());
    };

    if !is_signed_by(key, &result.hash, result.signature_bytes()) {
        return Err(Sep10Error::MissingClientDomainSignature(key.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use stellar_xdr::curr::{
        DecoratedSignature, Memo, MuxedAccount, Preconditions, SequenceNumber, Signature,
        SignatureHint, Transaction, TransactionExt, Uint256, VecM,
    };

    use super::*;
    use crate::auth::crypto::Keypair;
    use crate::auth::horizon::{AccountSigner, Thresholds};

    fn result_signed_by(
        client: &Keypair,
        client_domain: Option<&str>,
        signers: &[&Keypair],
    ) -> ChallengeValidationResult {
        let hash = [7u8; 32];
        let signatures = signers
            .iter()
            .map(|keypair| DecoratedSignature {
                hint: SignatureHint(keypair.signature_hint()),
                signature: Signature(keypair.sign(&hash).to_vec().try_into().unwrap()),
            })
            .collect();

        ChallengeValidationResult {
            transaction: Transaction {
                source_account: MuxedAccount::Ed25519(Uint256([0; 32])),
                fee: 200,
                seq_num: SequenceNumber(0),
                cond: Preconditions::None,
                memo: Memo::None,
                operations: VecM::default(),
                ext: TransactionExt::V0,
            },
            signatures,
            hash,
            client_account_id: client.address().to_string(),
            home_domain: "sdp.example.com".to_string(),
            memo: None,
            client_domain: client_domain.map(str::to_string),
            client_domain_account: None,
            nonce: String::new(),
        }
    }

    fn account(signers: &[(&Keypair, u32)], med_threshold: u8) -> Account {
        Account {
            account_id: signers
                .first()
                .map(|(keypair, _)| keypair.address().to_string())
                .unwrap_or_default(),
            signers: signers
                .iter()
                .map(|(keypair, weight)| AccountSigner {
                    key: keypair.address().to_string(),
                    weight: *weight,
                    signer_type: "ed25519_public_key".to_string(),
                })
                .collect(),
            thresholds: Thresholds {
                low_threshold: 1,
                med_threshold,
                high_threshold: 20,
            },
        }
    }

    #[test]
    fn test_non_existent_account_with_exact_signatures() {
        let server = Keypair::random();
        let client = Keypair::random();

        let result = result_signed_by(&client, None, &[&server, &client]);
        assert!(verify_non_existent_account(&result, None).is_ok());
    }

    #[test]
    fn test_non_existent_account_rejects_extra_signature() {
        let server = Keypair::random();
        let client = Keypair::random();
        let stranger = Keypair::random();

        let result = result_signed_by(&client, None, &[&server, &client, &stranger]);
        assert!(matches!(
            verify_non_existent_account(&result, None),
            Err(Sep10Error::SignatureCountMismatch {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn test_non_existent_account_requires_master_key() {
        let server = Keypair::random();
        let client = Keypair::random();
        let stranger = Keypair::random();

        let result = result_signed_by(&client, None, &[&server, &stranger]);
        assert!(matches!(
            verify_non_existent_account(&result, None),
            Err(Sep10Error::MissingClientSignature(_))
        ));
    }

    #[test]
    fn test_non_existent_account_with_client_domain() {
        let server = Keypair::random();
        let client = Keypair::random();
        let domain_key = Keypair::random();

        let result = result_signed_by(
            &client,
            Some("chaos.cadia.com"),
            &[&server, &client, &domain_key],
        );
        assert!(verify_non_existent_account(&result, Some(domain_key.address())).is_ok());

        let result = result_signed_by(&client, Some("chaos.cadia.com"), &[&server, &client]);
        assert!(matches!(
            verify_non_existent_account(&result, Some(domain_key.address())),
            Err(Sep10Error::SignatureCountMismatch {
                expected: 3,
                got: 2
            })
        ));

        let stranger = Keypair::random();
        let result = result_signed_by(
            &client,
            Some("chaos.cadia.com"),
            &[&server, &client, &stranger],
        );
        assert!(matches!(
            verify_non_existent_account(&result, Some(domain_key.address())),
            Err(Sep10Error::MissingClientDomainSignature(_))
        ));
    }

    #[test]
    fn test_threshold_requires_both_signers() {
        let server = Keypair::random();
        let a = Keypair::random();
        let b = Keypair::random();
        let account = account(&[(&a, 5), (&b, 5)], 10);

        let only_a = result_signed_by(&a, None, &[&server, &a]);
        assert!(matches!(
            verify_threshold(&only_a, &account, None),
            Err(Sep10Error::ThresholdNotMet { got: 5, need: 10 })
        ));

        let both = result_signed_by(&a, None, &[&server, &a, &b]);
        assert_eq!(verify_threshold(&both, &account, None).unwrap(), 10);
    }

    #[test]
    fn test_duplicate_signatures_count_once() {
        let server = Keypair::random();
        let a = Keypair::random();
        let b = Keypair::random();
        let account = account(&[(&a, 5), (&b, 5)], 10);

        let result = result_signed_by(&a, None, &[&server, &a, &a]);
        assert_eq!(signer_weight(&result, &account), 5);
        assert!(verify_threshold(&result, &account, None).is_err());
    }

    #[test]
    fn test_zero_threshold_still_needs_a_signer() {
        let server = Keypair::random();
        let client = Keypair::random();
        let account = account(&[(&client, 1)], 0);

        let unsigned = result_signed_by(&client, None, &[&server]);
        assert!(matches!(
            verify_threshold(&unsigned, &account, None),
            Err(Sep10Error::ThresholdNotMet { got: 0, need: 0 })
        ));

        let signed = result_signed_by(&client, None, &[&server, &client]);
        assert_eq!(verify_threshold(&signed, &account, None).unwrap(), 1);
    }

    #[test]
    fn test_threshold_checks_client_domain_signature() {
        let server = Keypair::random();
        let client = Keypair::random();
        let domain_key = Keypair::random();
        let account = account(&[(&client, 10)], 10);

        let result = result_signed_by(&client, Some("chaos.cadia.com"), &[&server, &client]);
        assert!(matches!(
            verify_threshold(&result, &account, Some(domain_key.address())),
            Err(Sep10Error::MissingClientDomainSignature(_))
        ));
    }

    #[test]
    fn test_non_ed25519_signers_are_ignored() {
        let server = Keypair::random();
        let client = Keypair::random();
        let mut account = account(&[(&client, 10)], 10);
        account.signers.push(AccountSigner {
            key: "XDRPF6NZRR7EEVO7ESIWUDXHAOMM2QSKIQQBJK6I2FB7YKDZES5A7HI".to_string(),
            weight: 10,
            signer_type: "sha256_hash".to_string(),
        });

        let result = result_signed_by(&client, None, &[&server, &client]);
        assert_eq!(signer_weight(&result, &account), 10);
    }
}
