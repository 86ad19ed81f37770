use crate::error::{CoreError, Result};
use crate::tenant::validate_slug;
use crate::types::ProvisioningState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AdminUser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

// ---------------------------------------------------------------------------
// ProvisioningRequest
// ---------------------------------------------------------------------------

/// Body of `POST /tenants/provision`. Checked locally before any network
/// call is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub name: String,
    pub slug: String,
    pub tier: String,
    pub admin_user: AdminUser,
}

impl ProvisioningRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidProvisioningRequest(
                "name must not be empty".to_string(),
            ));
        }
        validate_slug(&self.slug)?;
        if self.tier.trim().is_empty() {
            return Err(CoreError::InvalidProvisioningRequest(
                "tier must not be empty".to_string(),
            ));
        }
        if !self.admin_user.email.contains('@') {
            return Err(CoreError::InvalidProvisioningRequest(format!(
                "invalid admin email '{}'",
                self.admin_user.email
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProvisioningTicket / ProvisioningStatus
// ---------------------------------------------------------------------------

/// Returned by the provisioning endpoint; the request id is the handle for
/// later polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningTicket {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningStatus {
    pub request_id: String,
    pub status: ProvisioningState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProvisioningRequest {
        ProvisioningRequest {
            name: "Acme".into(),
            slug: "acme".into(),
            tier: "basic".into(),
            admin_user: AdminUser {
                email: "a@acme.com".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            },
        }
    }

    #[test]
    fn valid_request() {
        request().validate().unwrap();
    }

    #[test]
    fn rejects_bad_slug() {
        let mut req = request();
        req.slug = "Not A Slug".into();
        assert!(matches!(
            req.validate().unwrap_err(),
            CoreError::InvalidSlug(_)
        ));
    }

    #[test]
    fn rejects_empty_name_and_tier() {
        let mut req = request();
        req.name = "  ".into();
        assert!(req.validate().is_err());

        let mut req = request();
        req.tier = "".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_invalid_email() {
        let mut req = request();
        req.admin_user.email = "not-an-email".into();
        assert!(matches!(
            req.validate().unwrap_err(),
            CoreError::InvalidProvisioningRequest(_)
        ));
    }

    #[test]
    fn status_parses_wire_payload() {
        let status: ProvisioningStatus = serde_json::from_str(
            r#"{"request_id":"req-9","status":"running","current_step":"create_portal","updated_at":"2026-08-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(status.status, ProvisioningState::Running);
        assert_eq!(status.current_step.as_deref(), Some("create_portal"));
        assert!(!status.status.is_settled());
    }
}
