use crate::types::HealthState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TenantUsage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantUsage {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub bandwidth_gb: f64,
    pub active_subscribers: u32,
    pub api_requests: u64,
}

// ---------------------------------------------------------------------------
// HealthReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub state: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthState,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.overall == HealthState::Healthy
    }

    pub fn failing_checks(&self) -> Vec<&HealthCheck> {
        self.checks
            .iter()
            .filter(|c| c.state != HealthState::Healthy)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TenantEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEvent {
    pub id: String,
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
