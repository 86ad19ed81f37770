use crate::step::{EvidenceRequirements, Step};
use crate::types::StepStatus;
use crate::workflow::WorkflowInstance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StepTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub evidence_requirements: EvidenceRequirements,
}

impl StepTemplate {
    fn to_step(&self) -> Step {
        Step {
            id: self.id.clone(),
            title: self.title.clone(),
            status: StepStatus::Pending,
            required: self.required,
            dependencies: self.dependencies.clone(),
            data: BTreeMap::new(),
            evidence: Vec::new(),
            evidence_requirements: self.evidence_requirements.clone(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowTemplate
// ---------------------------------------------------------------------------

/// Backend-defined blueprint from `/field-ops/workflow-templates/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub steps: Vec<StepTemplate>,
}

fn default_version() -> u32 {
    1
}

impl WorkflowTemplate {
    /// Mint a local instance for a work order. The id is a locally generated
    /// placeholder; the backend's copy is authoritative once the instance is
    /// persisted, so the instance starts out sync-pending.
    pub fn materialize(&self, work_order_id: impl Into<String>) -> WorkflowInstance {
        let steps = self.steps.iter().map(StepTemplate::to_step).collect();
        WorkflowInstance::new(
            Uuid::new_v4().to_string(),
            work_order_id,
            self.id.clone(),
            steps,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
