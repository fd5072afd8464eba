//! Anti-replay nonce storage
//!
//! A nonce is stored when a challenge is issued and consumed, at most once,
//! when the signed challenge is validated. Unconsumed nonces expire after the
//! store's TTL and are removed by [`NonceStore::purge_expired`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::models::Sep10Nonce;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NonceStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Nonce already stored")]
    Duplicate,
}

impl From<sqlx::Error> for NonceStoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => NonceStoreError::Duplicate,
            _ => NonceStoreError::Database(e.to_string()),
        }
    }
}

/// Storage for single-use challenge nonces
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Record a freshly issued nonce
    async fn store(&self, nonce: &str) -> Result<(), NonceStoreError>;

    /// Atomically check and invalidate a nonce.
    ///
    /// Returns `false` if the nonce was never stored, was already consumed
    /// or has expired.
    async fn consume(&self, nonce: &str) -> Result<bool, NonceStoreError>;

    /// Remove expired nonces, returning how many were removed
    async fn purge_expired(&self) -> Result<u64, NonceStoreError>;
}

/// Process-local nonce store
#[derive(Clone)]
pub struct InMemoryNonceStore {
    entries: Arc<RwLock<HashMap<String, Sep10Nonce>>>,
    ttl_seconds: i64,
}

impl InMemoryNonceStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl_seconds,
        }
    }

    /// Number of tracked nonces, expired ones included until purged
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn store(&self, nonce: &str) -> Result<(), NonceStoreError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        if entries.contains_key(nonce) {
            return Err(NonceStoreError::Duplicate);
        }

        entries.insert(
            nonce.to_string(),
            Sep10Nonce {
                nonce: nonce.to_string(),
                expires_at: now + Duration::seconds(self.ttl_seconds),
                consumed_at: None,
                created_at: now,
            },
        );

        Ok(())
    }

    async fn consume(&self, nonce: &str) -> Result<bool, NonceStoreError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get_mut(nonce) else {
            return Ok(false);
        };

        if entry.consumed_at.is_some() || entry.is_expired(now) {
            return Ok(false);
        }

        // Consumed entries stay until they expire so the nonce can't be stored again
        entry.consumed_at = Some(now);
        Ok(true)
    }

    async fn purge_expired(&self) -> Result<u64, NonceStoreError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));

        Ok((before - entries.len()) as u64)
    }
}

/// Nonce store backed by the `sep10_nonces` table
#[derive(Clone)]
pub struct PostgresNonceStore {
    db_pool: PgPool,
    ttl_seconds: i64,
}

impl PostgresNonceStore {
    pub fn new(db_pool: PgPool, ttl_seconds: i64) -> Self {
        Self {
            db_pool,
            ttl_seconds,
        }
    }

    /// Look up a stored nonce
    pub async fn get(&self, nonce: &str) -> Result<Option<Sep10Nonce>, NonceStoreError> {
        let record: Option<Sep10Nonce> = sqlx::query_as(
            r#"
            SELECT nonce, expires_at, consumed_at, created_at
            FROM sep10_nonces
            WHERE nonce = $1
            "#,
        )
        .bind(nonce)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl NonceStore for PostgresNonceStore {
    async fn store(&self, nonce: &str) -> Result<(), NonceStoreError> {
        let expires_at = Utc::now() + Duration::seconds(self.ttl_seconds);

        sqlx::query(
            r#"
            INSERT INTO sep10_nonces (nonce, expires_at)
            VALUES ($1, $2)
            "#,
        )
        .bind(nonce)
        .bind(expires_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn consume(&self, nonce: &str) -> Result<bool, NonceStoreError> {
        // Single conditional UPDATE: concurrent consumers race on the row lock
        // and only one of them sees rows_affected == 1
        let rows_affected = sqlx::query(
            r#"
            UPDATE sep10_nonces
            SET consumed_at = NOW()
            WHERE nonce = $1 AND consumed_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(nonce)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    async fn purge_expired(&self) -> Result<u64, NonceStoreError> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM sep10_nonces WHERE expires_at <= NOW()
            "#,
        )
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}

/// Periodically purge expired nonces until the returned task is aborted
pub fn spawn_nonce_sweeper(
    store: Arc<dyn NonceStore>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Nonce sweeper started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired SEP-10 nonces"),
                Err(e) => tracing::error!(error = %e, "Failed to purge expired SEP-10 nonces"),
            }
        }
    })
}
