//! Home-domain and web-auth-domain resolution
//!
//! The base domain is the host of the configured `BASE_URL`. In a
//! multi-tenant deployment the host of the current tenant's base URL is
//! also an acceptable home domain, and is the domain serving web auth.

use reqwest::Url;

use crate::models::Tenant;

/// Per-request view of the tenant being served
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    tenant: Option<Tenant>,
}

impl TenantContext {
    pub fn new(tenant: Option<Tenant>) -> Self {
        Self { tenant }
    }

    /// Context for a single-tenant deployment
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant: Tenant) -> Self {
        Self {
            tenant: Some(tenant),
        }
    }

    pub fn current(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    /// Host of the current tenant's base URL, if it has a usable one
    fn tenant_domain(&self) -> Option<String> {
        self.tenant
            .as_ref()
            .and_then(|tenant| tenant.base_url.as_deref())
            .and_then(host_of)
    }
}

/// Host (and explicit port) of `base_url`
pub fn base_domain(base_url: &str) -> Option<String> {
    host_of(base_url)
}

/// Domain serving the authentication endpoint for this request
pub fn web_auth_domain(base_url: &str, tenant: &TenantContext) -> String {
    tenant
        .tenant_domain()
        .or_else(|| base_domain(base_url))
        .unwrap_or_default()
}

/// Home domains a challenge may be issued for or validated against
pub fn allowed_home_domains(base_url: &str, tenant: &TenantContext) -> Vec<String> {
    let Some(base) = base_domain(base_url) else {
        return Vec::new();
    };

    let mut domains = vec![base];
    if let Some(tenant_domain) = tenant.tenant_domain() {
        if !domains.contains(&tenant_domain) {
            domains.push(tenant_domain);
        }
    }
    domains
}

/// URL scheme of `base_url`, defaulting to `http`
pub fn scheme(base_url: &str) -> String {
    Url::parse(base_url.trim())
        .ok()
        .map(|url| url.scheme().to_string())
        .filter(|scheme| !scheme.is_empty())
        .unwrap_or_else(|| "http".to_string())
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?;

    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
