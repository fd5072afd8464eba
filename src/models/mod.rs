//! Data models for SEP-10 web authentication

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

pub mod auth;
pub use auth::*;

/// Tenant of a multi-tenant deployment, as seen by the auth core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Base URL the tenant is served from, e.g. `https://acme.sdp.example`
    pub base_url: Option<String>,
}

/// Stored anti-replay nonce
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sep10Nonce {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Sep10Nonce {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
