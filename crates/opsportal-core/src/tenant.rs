use crate::error::{CoreError, Result};
use crate::types::{SyncStatus, TenantStatus};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(CoreError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ResourceLimits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub max_subscribers: u32,
    #[serde(default)]
    pub max_bandwidth_gb: u32,
    #[serde(default)]
    pub max_api_requests_per_min: u32,
}

// ---------------------------------------------------------------------------
// ResourceAllocation
// ---------------------------------------------------------------------------

/// One row of the `/tenants/{id}/resources` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    #[serde(rename = "type")]
    pub kind: String,
    pub allocated: f64,
    pub used: f64,
}

/// Percentage utilization per resource kind. A zero allocation reads 0.0
/// rather than dividing by zero.
pub fn resource_utilization(allocations: &[ResourceAllocation]) -> BTreeMap<String, f64> {
    allocations
        .iter()
        .map(|a| {
            let pct = if a.allocated == 0.0 {
                0.0
            } else {
                a.used / a.allocated * 100.0
            };
            (a.kind.clone(), pct)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PortalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_theme")]
    pub branding_theme: String,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_theme() -> String {
    "default".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            custom_domain: None,
            locale: default_locale(),
            branding_theme: default_theme(),
            features: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub status: TenantStatus,
    #[serde(default)]
    pub limits: ResourceLimits,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Suspend/resume/terminate are only meaningful while the tenant is
    /// active or suspended.
    pub fn can_manage(&self) -> bool {
        matches!(
            self.status,
            TenantStatus::Active | TenantStatus::Suspended
        )
    }

    pub fn ensure_transition(&self, target: TenantStatus) -> Result<()> {
        if self.status.can_become(target) {
            return Ok(());
        }
        let reason = match target {
            TenantStatus::Suspended => "only an active tenant can be suspended",
            TenantStatus::Active => "only a suspended tenant can be resumed",
            TenantStatus::Terminated => "only an active or suspended tenant can be terminated",
            TenantStatus::Provisioning => "provisioning is entered only at creation",
        };
        Err(CoreError::InvalidTransition {
            from: self.status.to_string(),
            to: target.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn set_status(&mut self, target: TenantStatus) {
        self.status = target;
        self.last_modified = Utc::now();
    }

    /// Apply a partial update locally. The copy is a speculative guess until
    /// the backend confirms it, so the sync marker flips to pending.
    pub fn apply(&mut self, patch: &TenantPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(tier) = &patch.tier {
            self.tier = tier.clone();
        }
        if let Some(email) = &patch.contact_email {
            self.contact_email = Some(email.clone());
        }
        if let Some(limits) = &patch.limits {
            self.limits = limits.clone();
        }
        self.last_modified = Utc::now();
        self.sync_status = SyncStatus::Pending;
    }
}

// ---------------------------------------------------------------------------
// TenantPatch
// ---------------------------------------------------------------------------

/// Partial fields for `PUT /tenants/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceLimits>,
}

impl TenantPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tier.is_none()
            && self.contact_email.is_none()
            && self.limits.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
