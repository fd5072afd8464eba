//! Client domain signing key resolution
//!
//! A client domain attests to its signing key through the `SIGNING_KEY`
//! entry of `https://<domain>/.well-known/stellar.toml`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::crypto::is_valid_account_id;

const WELL_KNOWN_PATH: &str = "/.well-known/stellar.toml";

/// stellar.toml documents larger than this are rejected
const STELLAR_TOML_MAX_SIZE: usize = 100 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainKeyError {
    #[error("invalid client domain {0:?}")]
    InvalidDomain(String),

    #[error("unable to fetch stellar.toml from {domain}: {reason}")]
    Fetch { domain: String, reason: String },

    #[error("stellar.toml from {0} exceeds 100 KiB")]
    TooLarge(String),

    #[error("invalid stellar.toml: {0}")]
    Parse(String),

    #[error("SIGNING_KEY not present in client_domain stellar.toml")]
    MissingSigningKey,

    #[error("SIGNING_KEY {0} is not a valid Stellar account ID")]
    InvalidSigningKey(String),
}

/// Resolves the attested signing key of a domain
#[async_trait]
pub trait DomainKeyResolver: Send + Sync {
    async fn signing_key(&self, domain: &str) -> Result<String, DomainKeyError>;
}

#[derive(Deserialize)]
struct StellarToml {
    #[serde(rename = "SIGNING_KEY")]
    signing_key: Option<String>,
}

/// Extract and validate `SIGNING_KEY` from a stellar.toml document
pub fn parse_signing_key(body: &str) -> Result<String, DomainKeyError> {
    signing_key_of(parse_document(body)?)
}

fn parse_document(body: &str) -> Result<StellarToml, DomainKeyError> {
    toml::from_str(body).map_err(|e| DomainKeyError::Parse(e.to_string()))
}

fn signing_key_of(document: StellarToml) -> Result<String, DomainKeyError> {
    let signing_key = document
        .signing_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(DomainKeyError::MissingSigningKey)?;

    if !is_valid_account_id(&signing_key) {
        return Err(DomainKeyError::InvalidSigningKey(signing_key));
    }

    Ok(signing_key)
}

/// [`DomainKeyResolver`] fetching the domain's well-known stellar.toml
#[derive(Clone)]
pub struct StellarTomlResolver {
    client: Client,
    allow_http_retry: bool,
}

impl StellarTomlResolver {
    pub fn new(timeout: Duration, allow_http_retry: bool) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            allow_http_retry,
        }
    }

    async fn fetch(&self, domain: &str, scheme: &str) -> Result<String, DomainKeyError> {
        let url = stellar_toml_url(domain, scheme);
        let fetch_error = |reason: String| DomainKeyError::Fetch {
            domain: domain.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("{} returned {}", url, response.status())));
        }

        if response
            .content_length()
            .is_some_and(|len| len as usize > STELLAR_TOML_MAX_SIZE)
        {
            return Err(DomainKeyError::TooLarge(domain.to_string()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if body.len() > STELLAR_TOML_MAX_SIZE {
            return Err(DomainKeyError::TooLarge(domain.to_string()));
        }

        String::from_utf8(body.to_vec()).map_err(|e| DomainKeyError::Parse(e.to_string()))
    }

    async fn fetch_document(
        &self,
        domain: &str,
        scheme: &str,
    ) -> Result<StellarToml, DomainKeyError> {
        let body = self.fetch(domain, scheme).await?;
        parse_document(&body)
    }
}

#[async_trait]
impl DomainKeyResolver for StellarTomlResolver {
    async fn signing_key(&self, domain: &str) -> Result<String, DomainKeyError> {
        validate_domain(domain)?;

        // Any fetch or parse failure over https may be retried; a missing or
        // invalid SIGNING_KEY in a parsed document may not
        let document = match self.fetch_document(domain, "https").await {
            Ok(document) => document,
            Err(e) if self.allow_http_retry => {
                tracing::warn!(
                    client_domain = %domain,
                    error = %e,
                    "Reading stellar.toml over https failed, retrying over http"
                );
                self.fetch_document(domain, "http").await?
            }
            Err(e) => return Err(e),
        };

        signing_key_of(document)
    }
}

fn stellar_toml_url(domain: &str, scheme: &str) -> String {
    format!("{}://{}{}", scheme, domain, WELL_KNOWN_PATH)
}

/// A domain is a bare host with an optional port
fn validate_domain(domain: &str) -> Result<(), DomainKeyError> {
    let is_valid = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));

    if is_valid {
        Ok(())
    } else {
        Err(DomainKeyError::InvalidDomain(domain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::Keypair;

    #[test]
    fn test_parse_signing_key() {
        let keypair = Keypair::random();
        let body = format!(
            r#"
NETWORK_PASSPHRASE = "Test SDF Network ; September 2015"
SIGNING_KEY = "{}"

[DOCUMENTATION]
ORG_NAME = "Cadia Wallet"
"#,
            keypair.address()
        );

        assert_eq!(parse_signing_key(&body).unwrap(), keypair.address());
    }

    #[test]
    fn test_missing_signing_key() {
        let body = r#"NETWORK_PASSPHRASE = "Test SDF Network ; September 2015""#;
        assert_eq!(
            parse_signing_key(body),
            Err(DomainKeyError::MissingSigningKey)
        );
        assert_eq!(
            parse_signing_key(r#"SIGNING_KEY = "  ""#),
            Err(DomainKeyError::MissingSigningKey)
        );
    }

    #[test]
    fn test_invalid_signing_key() {
        assert_eq!(
            parse_signing_key(r#"SIGNING_KEY = "GINVALID""#),
            Err(DomainKeyError::InvalidSigningKey("GINVALID".to_string()))
        );
    }

    #[test]
    fn test_unparseable_document() {
        assert!(matches!(
            parse_signing_key("SIGNING_KEY = "),
            Err(DomainKeyError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain("chaos.cadia.com").is_ok());
        assert!(validate_domain("localhost:8000").is_ok());
        assert!(validate_domain("").is_err());
        assert!(validate_domain("evil.com/path?").is_err());
        assert!(validate_domain("user@evil.com").is_err());
    }

    /// Serve `body` as a plain-http response to every connection
    async fn serve_http(body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        addr.to_string()
    }

    #[tokio::test]
    async fn test_http_retry_after_failed_https() {
        let keypair = Keypair::random();
        let domain = serve_http(format!(r#"SIGNING_KEY = "{}""#, keypair.address())).await;

        // The https handshake fails against a plain-http server
        let strict = StellarTomlResolver::new(Duration::from_secs(5), false);
        assert!(matches!(
            strict.signing_key(&domain).await,
            Err(DomainKeyError::Fetch { .. })
        ));

        let lenient = StellarTomlResolver::new(Duration::from_secs(5), true);
        assert_eq!(
            lenient.signing_key(&domain).await.unwrap(),
            keypair.address()
        );
    }

    #[tokio::test]
    async fn test_http_retry_reports_missing_signing_key() {
        let body = r#"NETWORK_PASSPHRASE = "Test SDF Network ; September 2015""#;
        let domain = serve_http(body.to_string()).await;

        let lenient = StellarTomlResolver::new(Duration::from_secs(5), true);
        assert_eq!(
            lenient.signing_key(&domain).await,
            Err(DomainKeyError::MissingSigningKey)
        );
    }

    #[test]
    fn test_stellar_toml_url() {
        assert_eq!(
            stellar_toml_url("chaos.cadia.com", "https"),
            "https://chaos.cadia.com/.well-known/stellar.toml"
        );
    }
}
