use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::services::{AuthError, LicenseDirectory};

/// A protected area of the property, each served from its own subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Book,
    Lab,
    App,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "book" => Ok(Scope::Book),
            "lab" => Ok(Scope::Lab),
            "app" => Ok(Scope::App),
            other => Err(format!("Unknown scope: {}", other)),
        }
    }
}

/// License tiers sold by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Individual,
    Academic,
    Corporate,
    Enterprise,
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Tier::Individual),
            "academic" => Ok(Tier::Academic),
            "corporate" => Ok(Tier::Corporate),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("Unknown tier: {}", other)),
        }
    }
}

/// Host and tier mapping rules, assembled from configuration.
#[derive(Debug, Clone)]
pub struct EntitlementPolicy {
    pub book_domain: Option<String>,
    pub lab_domain: Option<String>,
    pub app_domain: Option<String>,
    pub grants: HashMap<Tier, Vec<Scope>>,
    /// Hosts that resolve to no scope are allowed through when true, so
    /// internal and infrastructure hosts are never locked out.
    pub fail_open_unknown_hosts: bool,
}

impl EntitlementPolicy {
    pub fn default_grants() -> HashMap<Tier, Vec<Scope>> {
        HashMap::from([
            (Tier::Individual, vec![Scope::Book, Scope::App]),
            (Tier::Academic, vec![Scope::Book, Scope::App, Scope::Lab]),
            (Tier::Corporate, vec![Scope::Book, Scope::App, Scope::Lab]),
            (Tier::Enterprise, vec![Scope::Book, Scope::App, Scope::Lab]),
        ])
    }

    /// Map a requesting host to a scope: explicit domain config first,
    /// then the subdomain-prefix convention.
    pub fn scope_for_host(&self, host: &str) -> Option<Scope> {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        if self.book_domain.as_deref() == Some(host.as_str()) {
            return Some(Scope::Book);
        }
        if self.lab_domain.as_deref() == Some(host.as_str()) {
            return Some(Scope::Lab);
        }
        if self.app_domain.as_deref() == Some(host.as_str()) {
            return Some(Scope::App);
        }
        if host.starts_with("book.") {
            return Some(Scope::Book);
        }
        if host.starts_with("lab.") {
            return Some(Scope::Lab);
        }
        if host.starts_with("app.") {
            return Some(Scope::App);
        }
        None
    }

    pub fn tier_grants(&self, tier: Tier, scope: Scope) -> bool {
        self.grants
            .get(&tier)
            .map(|scopes| scopes.contains(&scope))
            .unwrap_or(false)
    }
}

/// Decides whether an authenticated identity may use a given host, from
/// the licenses the storefront has on record.
#[derive(Clone)]
pub struct EntitlementGate {
    policy: EntitlementPolicy,
    licenses: Arc<dyn LicenseDirectory>,
}

impl EntitlementGate {
    pub fn new(policy: EntitlementPolicy, licenses: Arc<dyn LicenseDirectory>) -> Self {
        Self { policy, licenses }
    }

    /// Directory failures propagate as `Licensing` errors; the boundary
    /// treats those as authentication failures, never as access granted.
    pub async fn has_entitlement(&self, email: &str, host: &str) -> Result<bool, AuthError> {
        let Some(scope) = self.policy.scope_for_host(host) else {
            if self.policy.fail_open_unknown_hosts {
                tracing::debug!(host = %host, "unrecognized host, allowing by policy");
                return Ok(true);
            }
            return Ok(false);
        };

        let licenses = self
            .licenses
            .active_licenses(email)
            .await
            .map_err(AuthError::Licensing)?;

        let allowed = licenses.iter().any(|license| {
            license
                .tier
                .parse::<Tier>()
                .map(|tier| self.policy.tier_grants(tier, scope))
                .unwrap_or(false)
        });

        Ok(allowed)
    }
}
