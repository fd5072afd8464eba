//! SEP-10 authentication service
//!
//! Issues challenge transactions and exchanges signed challenges for
//! session tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::config::Sep10Config;
use crate::db;
use crate::models::{ChallengeRequest, ChallengeResponse, ValidationRequest, ValidationResponse};

use super::challenge::{generate_nonce, ChallengeBuilder, ChallengeParams, ClientDomain};
use super::crypto::Keypair;
use super::domain::{allowed_home_domains, base_domain, scheme, web_auth_domain, TenantContext};
use super::error::{ErrorKind, Sep10Error};
use super::horizon::{AccountLookup, AccountLookupError, HorizonClient};
use super::jwt::{JwtManager, Sep10Claims, TokenSigner};
use super::nonce::{spawn_nonce_sweeper, InMemoryNonceStore, NonceStore, PostgresNonceStore};
use super::signatures::{verify_non_existent_account, verify_threshold};
use super::stellar_toml::{DomainKeyResolver, StellarTomlResolver};
use super::transaction::encode_envelope;
use super::validator::{ChallengeValidationResult, ChallengeValidator};

/// External collaborators of [`Sep10Service`]
#[derive(Clone)]
pub struct Sep10Collaborators {
    pub nonce_store: Arc<dyn NonceStore>,
    pub account_lookup: Arc<dyn AccountLookup>,
    pub domain_key_resolver: Arc<dyn DomainKeyResolver>,
    pub token_signer: Arc<dyn TokenSigner>,
}

/// SEP-10 challenge-response authentication service
#[derive(Clone)]
pub struct Sep10Service {
    base_url: String,
    network_passphrase: String,
    jwt_expiration_seconds: i64,
    client_attribution_required: bool,
    builder: ChallengeBuilder,
    validator: ChallengeValidator,
    nonce_store: Arc<dyn NonceStore>,
    account_lookup: Arc<dyn AccountLookup>,
    domain_key_resolver: Arc<dyn DomainKeyResolver>,
    token_signer: Arc<dyn TokenSigner>,
    _sweeper: Option<Arc<SweeperGuard>>,
}

/// Stops the nonce expiry sweep when the last service clone is dropped
struct SweeperGuard(JoinHandle<()>);

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Sep10Service {
    /// Create a new Sep10Service
    pub fn new(config: &Sep10Config, collaborators: Sep10Collaborators) -> Result<Self, Sep10Error> {
        let server_keypair = Keypair::from_secret_seed(&config.signing_private_key)
            .map_err(|e| Sep10Error::Internal(format!("parsing signing key: {}", e)))?;

        let validator = ChallengeValidator::new(
            server_keypair.address().to_string(),
            config.network_passphrase.clone(),
            config.client_attribution_required,
        );
        let builder = ChallengeBuilder::new(
            Arc::new(server_keypair),
            config.network_passphrase.clone(),
            Duration::from_secs(config.auth_timeout_seconds),
        )?;

        Ok(Self {
            base_url: config.base_url.clone(),
            network_passphrase: config.network_passphrase.clone(),
            jwt_expiration_seconds: config.jwt_expiration_seconds,
            client_attribution_required: config.client_attribution_required,
            builder,
            validator,
            nonce_store: collaborators.nonce_store,
            account_lookup: collaborators.account_lookup,
            domain_key_resolver: collaborators.domain_key_resolver,
            token_signer: collaborators.token_signer,
            _sweeper: None,
        })
    }

    /// Wire the service to Horizon, stellar.toml resolution and the
    /// configured nonce storage, and start sweeping expired nonces every
    /// `nonce_ttl_seconds`. Must be called inside a Tokio runtime.
    pub async fn from_config(config: &Sep10Config) -> Result<Self, Sep10Error> {
        let http_timeout = Duration::from_secs(config.http_client_timeout_seconds);

        let nonce_store: Arc<dyn NonceStore> = match &config.database_url {
            Some(_) => {
                let pool = db::create_pool(config)
                    .await
                    .map_err(|e| Sep10Error::Internal(e.to_string()))?;
                db::run_migrations(&pool)
                    .await
                    .map_err(|e| Sep10Error::Internal(e.to_string()))?;
                Arc::new(PostgresNonceStore::new(pool, config.nonce_ttl_seconds))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, SEP-10 nonces are kept in memory");
                Arc::new(InMemoryNonceStore::new(config.nonce_ttl_seconds))
            }
        };

        let collaborators = Sep10Collaborators {
            nonce_store,
            account_lookup: Arc::new(HorizonClient::new(
                config.horizon_url.clone(),
                http_timeout,
            )),
            domain_key_resolver: Arc::new(StellarTomlResolver::new(
                http_timeout,
                config.allow_http_retry,
            )),
            token_signer: Arc::new(JwtManager::new(config.jwt_secret.clone())?),
        };

        let mut service = Self::new(config, collaborators)?;

        let sweep_interval =
            Duration::from_secs(u64::try_from(config.nonce_ttl_seconds).unwrap_or(0).max(1));
        service._sweeper = Some(Arc::new(SweeperGuard(spawn_nonce_sweeper(
            service.nonce_store(),
            sweep_interval,
        ))));

        tracing::info!(
            server_account = %service.server_account(),
            base_url = %service.base_url,
            client_attribution_required = service.client_attribution_required,
            "SEP-10 service initialized"
        );

        Ok(service)
    }

    /// Address of the account signing challenges
    pub fn server_account(&self) -> &str {
        self.validator.server_account()
    }

    pub fn nonce_store(&self) -> Arc<dyn NonceStore> {
        Arc::clone(&self.nonce_store)
    }

    /// Issue a signed challenge transaction for `request.account`
    pub async fn create_challenge(
        &self,
        request: &ChallengeRequest,
        tenant: &TenantContext,
    ) -> Result<ChallengeResponse, Sep10Error> {
        let result = self.create_challenge_inner(request, tenant).await;
        if let Err(e) = &result {
            log_failure("Challenge creation failed", Some(&request.account), e);
        }
        result
    }

    async fn create_challenge_inner(
        &self,
        request: &ChallengeRequest,
        tenant: &TenantContext,
    ) -> Result<ChallengeResponse, Sep10Error> {
        let memo = request.validate()?;

        let home_domain = request
            .home_domain()
            .map(str::to_string)
            .or_else(|| base_domain(&self.base_url))
            .ok_or_else(|| Sep10Error::InvalidRequest("home_domain is required".to_string()))?;

        let allowed = allowed_home_domains(&self.base_url, tenant);
        if !allowed.contains(&home_domain) {
            return Err(Sep10Error::InvalidHomeDomain {
                home_domain,
                allowed,
            });
        }

        let web_auth_domain = web_auth_domain(&self.base_url, tenant);

        let client_domain = request.client_domain();
        if client_domain.is_none() && self.client_attribution_required {
            return Err(Sep10Error::InvalidRequest(
                "client_domain is required".to_string(),
            ));
        }

        let client_domain_key = match client_domain {
            Some(domain) => Some(self.domain_key_resolver.signing_key(domain).await?),
            None => None,
        };

        let nonce = generate_nonce()?;

        let envelope = self.builder.build(
            &ChallengeParams {
                client_account: &request.account,
                home_domain: &home_domain,
                web_auth_domain: &web_auth_domain,
                nonce: &nonce,
                memo,
                client_domain: client_domain.zip(client_domain_key.as_deref()).map(
                    |(domain, signing_key)| ClientDomain {
                        domain,
                        signing_key,
                    },
                ),
            },
            Utc::now(),
        )?;
        let transaction = encode_envelope(&envelope)?;

        // Nothing is stored for challenges that failed to build
        self.nonce_store.store(&nonce).await?;

        tracing::info!(
            account = %request.account,
            home_domain = %home_domain,
            client_domain = client_domain.unwrap_or_default(),
            "Issued SEP-10 challenge"
        );

        Ok(ChallengeResponse {
            transaction,
            network_passphrase: self.network_passphrase.clone(),
        })
    }

    /// Exchange a client-signed challenge for a session token
    pub async fn validate_challenge(
        &self,
        request: &ValidationRequest,
        tenant: &TenantContext,
    ) -> Result<ValidationResponse, Sep10Error> {
        let result = self.validate_challenge_inner(request, tenant).await;
        if let Err(e) = &result {
            log_failure("Challenge validation failed", None, e);
        }
        result
    }

    async fn validate_challenge_inner(
        &self,
        request: &ValidationRequest,
        tenant: &TenantContext,
    ) -> Result<ValidationResponse, Sep10Error> {
        request.validate()?;

        let home_domains = allowed_home_domains(&self.base_url, tenant);
        let web_auth_domain = web_auth_domain(&self.base_url, tenant);

        let challenge = self.validator.validate(
            &request.transaction,
            &web_auth_domain,
            &home_domains,
            Utc::now().timestamp(),
        )?;

        tracing::debug!(
            account = %challenge.client_account_id,
            home_domain = %challenge.home_domain,
            jti = %challenge.hash_hex(),
            "Challenge passed structural validation"
        );

        let client_domain_key = self.resolve_client_domain_key(&challenge).await?;

        match self.account_lookup.get(&challenge.client_account_id).await {
            Ok(account) => {
                verify_threshold(&challenge, &account, client_domain_key.as_deref())?;
            }
            Err(AccountLookupError::NotFound(_)) => {
                tracing::debug!(
                    account = %challenge.client_account_id,
                    "Account not found, verifying master key signature"
                );
                verify_non_existent_account(&challenge, client_domain_key.as_deref())?;
            }
            Err(e) => return Err(Sep10Error::AccountLookup(e)),
        }

        // Only a fully verified challenge may burn its nonce
        if !self.nonce_store.consume(&challenge.nonce).await? {
            return Err(Sep10Error::NonceInvalid);
        }

        let token = self.issue_token(&challenge)?;

        tracing::info!(
            account = %challenge.client_account_id,
            home_domain = %challenge.home_domain,
            client_domain = challenge.client_domain.as_deref().unwrap_or_default(),
            jti = %challenge.hash_hex(),
            "Validated SEP-10 challenge"
        );

        Ok(ValidationResponse { token })
    }

    /// Resolve the client domain's current signing key and check it is the
    /// key the challenge was issued for
    async fn resolve_client_domain_key(
        &self,
        challenge: &ChallengeValidationResult,
    ) -> Result<Option<String>, Sep10Error> {
        let Some(domain) = challenge.client_domain.as_deref() else {
            return Ok(None);
        };

        let resolved = self.domain_key_resolver.signing_key(domain).await?;
        let operation_source = challenge.client_domain_account.clone().unwrap_or_default();
        if resolved != operation_source {
            return Err(Sep10Error::ClientDomainKeyMismatch {
                resolved,
                operation_source,
            });
        }

        Ok(Some(resolved))
    }

    fn issue_token(&self, challenge: &ChallengeValidationResult) -> Result<String, Sep10Error> {
        let iat = i64::try_from(challenge.min_time())
            .map_err(|_| Sep10Error::Internal("challenge min_time out of range".to_string()))?;

        let sub = match challenge.memo {
            Some(memo) => format!("{}:{}", challenge.client_account_id, memo),
            None => challenge.client_account_id.clone(),
        };

        let claims = Sep10Claims {
            iss: format!("{}://{}/auth", scheme(&self.base_url), challenge.home_domain),
            sub,
            jti: challenge.hash_hex(),
            iat,
            exp: iat.saturating_add(self.jwt_expiration_seconds),
            client_domain: challenge.client_domain.clone(),
            home_domain: Some(challenge.home_domain.clone()),
        };

        Ok(self.token_signer.issue(&claims)?)
    }
}

fn log_failure(message: &str, account: Option<&str>, error: &Sep10Error) {
    let account = account.unwrap_or_default();
    match error.kind() {
        ErrorKind::Internal | ErrorKind::LedgerLookup => {
            tracing::error!(account = %account, error = %error, "{}", message);
        }
        _ => {
            tracing::warn!(account = %account, error = %error, "{}", message);
        }
    }
}
