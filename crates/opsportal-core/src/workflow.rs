use crate::error::{CoreError, Result};
use crate::step::{Evidence, Step};
use crate::types::{StepStatus, SyncStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// A field-service workflow bound to one work order: an ordered sequence of
/// steps with dependency guards, plus workflow-level lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
    pub work_order_id: String,
    pub template_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    pub last_modified: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(
        id: impl Into<String>,
        work_order_id: impl Into<String>,
        template_id: impl Into<String>,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            id: id.into(),
            work_order_id: work_order_id.into(),
            template_id: template_id.into(),
            status: WorkflowStatus::NotStarted,
            steps,
            current_step_id: None,
            started_at: None,
            completed_at: None,
            total_duration_minutes: None,
            cancel_reason: None,
            sync_status: SyncStatus::Pending,
            last_modified: Utc::now(),
        }
    }

    // ---------------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------------

    pub fn step(&self, step_id: &str) -> Result<&Step> {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| CoreError::StepNotFound(step_id.to_string()))
    }

    fn step_mut(&mut self, step_id: &str) -> Result<&mut Step> {
        self.steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| CoreError::StepNotFound(step_id.to_string()))
    }

    pub fn current_step(&self) -> Option<&Step> {
        let id = self.current_step_id.as_deref()?;
        self.steps.iter().find(|s| s.id == id)
    }

    fn completed_ids(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.id.as_str())
            .collect()
    }

    /// Every dependency id must refer to a step that is currently completed.
    pub fn dependencies_met(&self, step_id: &str) -> Result<()> {
        let step = self.step(step_id)?;
        let completed = self.completed_ids();
        for dep in &step.dependencies {
            if !completed.contains(dep.as_str()) {
                return Err(CoreError::DependencyNotMet {
                    step: step_id.to_string(),
                    missing: dep.clone(),
                });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Step transitions
    // ---------------------------------------------------------------------------

    pub fn start_step(&mut self, step_id: &str) -> Result<()> {
        self.ensure_mutable()?;
        let status = self.step(step_id)?.status;
        if status != StepStatus::Pending {
            return Err(CoreError::StepNotPending(step_id.to_string()));
        }
        self.dependencies_met(step_id)?;

        self.mark_active();
        let step = self.step_mut(step_id)?;
        step.status = StepStatus::InProgress;
        step.started_at = Some(Utc::now());
        self.current_step_id = Some(step_id.to_string());
        self.touch();
        Ok(())
    }

    pub fn complete_step(
        &mut self,
        step_id: &str,
        data: BTreeMap<String, serde_json::Value>,
        evidence: Vec<Evidence>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.mark_active();
        {
            let step = self.step_mut(step_id)?;
            step.status = StepStatus::Completed;
            step.completed_at = Some(Utc::now());
            step.data.extend(data);
            step.evidence.extend(evidence);
        }
        self.advance_current_step();
        self.touch();
        Ok(())
    }

    pub fn skip_step(&mut self, step_id: &str, reason: Option<&str>) -> Result<()> {
        self.ensure_mutable()?;
        if self.step(step_id)?.required {
            return Err(CoreError::RequiredStep(step_id.to_string()));
        }
        self.mark_active();
        {
            let step = self.step_mut(step_id)?;
            step.status = StepStatus::Skipped;
            step.completed_at = Some(Utc::now());
            if let Some(reason) = reason {
                step.data
                    .insert("skip_reason".to_string(), serde_json::json!(reason));
            }
        }
        self.advance_current_step();
        self.touch();
        Ok(())
    }

    /// Reversible: the step returns to pending and nothing is current.
    pub fn pause_step(&mut self, step_id: &str) -> Result<()> {
        self.ensure_mutable()?;
        {
            let step = self.step_mut(step_id)?;
            if step.status != StepStatus::InProgress {
                return Err(CoreError::StepNotInProgress(step_id.to_string()));
            }
            step.status = StepStatus::Pending;
        }
        self.current_step_id = None;
        self.touch();
        Ok(())
    }

    pub fn fail_step(&mut self, step_id: &str, reason: &str) -> Result<()> {
        self.ensure_mutable()?;
        {
            let step = self.step_mut(step_id)?;
            if step.status != StepStatus::InProgress {
                return Err(CoreError::StepNotInProgress(step_id.to_string()));
            }
            step.status = StepStatus::Failed;
            step.completed_at = Some(Utc::now());
            step.data
                .insert("failure_reason".to_string(), serde_json::json!(reason));
        }
        self.current_step_id = None;
        self.touch();
        Ok(())
    }

    /// First step, in original order, that is pending with all dependencies
    /// completed. `None` when nothing is eligible.
    fn advance_current_step(&mut self) {
        let completed: HashSet<String> = self
            .completed_ids()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.current_step_id = self
            .steps
            .iter()
            .find(|s| {
                s.status == StepStatus::Pending
                    && s.dependencies.iter().all(|d| completed.contains(d))
            })
            .map(|s| s.id.clone());
    }

    // ---------------------------------------------------------------------------
    // Workflow transitions
    // ---------------------------------------------------------------------------

    /// Reasons the workflow cannot complete yet: required steps not completed,
    /// or completed steps whose declared evidence minimums are unmet.
    pub fn completion_blockers(&self) -> Vec<String> {
        let mut blockers = Vec::new();
        for step in &self.steps {
            if step.required && step.status != StepStatus::Completed {
                blockers.push(format!(
                    "required step '{}' is {}",
                    step.id, step.status
                ));
            }
            if step.status == StepStatus::Completed {
                for gap in step.evidence_gaps() {
                    blockers.push(format!("step '{}': {}", step.id, gap));
                }
            }
        }
        blockers
    }

    pub fn complete(&mut self) -> Result<()> {
        if self.status != WorkflowStatus::InProgress {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: WorkflowStatus::Completed.to_string(),
                reason: "only an in-progress workflow can complete".to_string(),
            });
        }
        let blockers = self.completion_blockers();
        if !blockers.is_empty() {
            return Err(CoreError::IncompleteWorkflow(blockers.join("; ")));
        }

        let now = Utc::now();
        self.status = WorkflowStatus::Completed;
        self.completed_at = Some(now);
        self.total_duration_minutes = self.started_at.map(|s| (now - s).num_minutes());
        self.current_step_id = None;
        self.touch();
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<&str>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: WorkflowStatus::Cancelled.to_string(),
                reason: "workflow already finished".to_string(),
            });
        }
        self.status = WorkflowStatus::Cancelled;
        self.cancel_reason = reason.map(str::to_string);
        self.current_step_id = None;
        self.touch();
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Derived values
    // ---------------------------------------------------------------------------

    /// Percentage of steps in a terminal status. An empty workflow reads 100.
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 100.0;
        }
        let terminal = self.steps.iter().filter(|s| s.is_terminal()).count();
        terminal as f64 / self.steps.len() as f64 * 100.0
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    // ---------------------------------------------------------------------------
    // Internal
    // ---------------------------------------------------------------------------

    fn ensure_mutable(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: WorkflowStatus::InProgress.to_string(),
                reason: "workflow already finished".to_string(),
            });
        }
        Ok(())
    }

    /// Any step activity moves a fresh workflow into in-progress.
    fn mark_active(&mut self) {
        if self.status == WorkflowStatus::NotStarted {
            self.status = WorkflowStatus::InProgress;
            self.started_at.get_or_insert_with(Utc::now);
        }
    }

    fn touch(&mut self) {
        self.last_modified = Utc::now();
        self.sync_status = SyncStatus::Pending;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::EvidenceRequirements;

    fn workflow(steps: Vec<Step>) -> WorkflowInstance {
        WorkflowInstance::new("wf-1", "wo-42", "tpl-install", steps)
    }

    fn two_step_install() -> WorkflowInstance {
        let mut survey = Step::new("survey", "Site survey", true);
        survey.dependencies = vec![];
        let mut install = Step::new("install", "Install ONT", true);
        install.dependencies = vec!["survey".to_string()];
        workflow(vec![survey, install])
    }

    #[test]
    fn start_requires_completed_dependencies() {
        let mut wf = two_step_install();
        let err = wf.start_step("install").unwrap_err();
        assert!(matches!(err, CoreError::DependencyNotMet { .. }));
        // Guard failure leaves no trace
        assert_eq!(wf.step("install").unwrap().status, StepStatus::Pending);
        assert_eq!(wf.status, WorkflowStatus::NotStarted);

        wf.complete_step("survey", BTreeMap::new(), vec![]).unwrap();
        wf.start_step("install").unwrap();
        assert_eq!(wf.step("install").unwrap().status, StepStatus::InProgress);
        assert_eq!(wf.current_step_id.as_deref(), Some("install"));
        assert!(wf.step("install").unwrap().started_at.is_some());
    }

    #[test]
    fn first_start_activates_workflow() {
        let mut wf = two_step_install();
        wf.start_step("survey").unwrap();
        assert_eq!(wf.status, WorkflowStatus::InProgress);
        assert!(wf.started_at.is_some());
        assert_eq!(wf.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn required_step_cannot_be_skipped() {
        let mut wf = two_step_install();
        let err = wf.skip_step("survey", Some("not needed")).unwrap_err();
        assert!(matches!(err, CoreError::RequiredStep(_)));
        assert_eq!(wf.step("survey").unwrap().status, StepStatus::Pending);
    }

    #[test]
    fn skip_records_reason_and_advances() {
        let mut a = Step::new("a", "A", true);
        a.dependencies = vec![];
        let mut b = Step::new("b", "B", false);
        b.dependencies = vec!["a".to_string()];
        let mut wf = workflow(vec![a, b]);

        wf.complete_step("a", BTreeMap::new(), vec![]).unwrap();
        wf.skip_step("b", Some("customer declined")).unwrap();

        let b = wf.step("b").unwrap();
        assert_eq!(b.status, StepStatus::Skipped);
        assert!(b.completed_at.is_some());
        assert_eq!(
            b.data.get("skip_reason"),
            Some(&serde_json::json!("customer declined"))
        );
        // Both steps terminal: nothing is current, progress is full
        assert_eq!(wf.current_step_id, None);
        assert_eq!(wf.progress(), 100.0);
    }

    #[test]
    fn completing_never_decreases_completed_count() {
        let mut wf = two_step_install();
        let mut last = wf.completed_count();
        for id in ["survey", "install"] {
            wf.complete_step(id, BTreeMap::new(), vec![]).unwrap();
            let count = wf.completed_count();
            assert!(count >= last);
            last = count;
        }
        assert_eq!(last, 2);
    }

    #[test]
    fn advance_picks_first_eligible_in_order() {
        let mut a = Step::new("a", "A", true);
        a.dependencies = vec![];
        let mut b = Step::new("b", "B", true);
        b.dependencies = vec!["a".to_string()];
        let mut c = Step::new("c", "C", true);
        c.dependencies = vec![];
        let mut wf = workflow(vec![a, b, c]);

        wf.complete_step("a", BTreeMap::new(), vec![]).unwrap();
        // b's dependency is met and b precedes c in original order
        assert_eq!(wf.current_step_id.as_deref(), Some("b"));
    }

    #[test]
    fn pause_returns_step_to_pending() {
        let mut wf = two_step_install();
        wf.start_step("survey").unwrap();
        wf.pause_step("survey").unwrap();
        assert_eq!(wf.step("survey").unwrap().status, StepStatus::Pending);
        assert_eq!(wf.current_step_id, None);

        // Pause only applies to an in-progress step
        assert!(matches!(
            wf.pause_step("survey").unwrap_err(),
            CoreError::StepNotInProgress(_)
        ));
    }

    #[test]
    fn fail_step_records_reason() {
        let mut wf = two_step_install();
        wf.start_step("survey").unwrap();
        wf.fail_step("survey", "no site access").unwrap();
        let step = wf.step("survey").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(
            step.data.get("failure_reason"),
            Some(&serde_json::json!("no site access"))
        );
        assert_eq!(wf.current_step_id, None);
    }

    #[test]
    fn complete_blocked_by_required_steps() {
        let mut wf = two_step_install();
        wf.complete_step("survey", BTreeMap::new(), vec![]).unwrap();

        let err = wf.complete().unwrap_err();
        assert!(matches!(err, CoreError::IncompleteWorkflow(_)));
        assert_eq!(wf.status, WorkflowStatus::InProgress);

        wf.complete_step("install", BTreeMap::new(), vec![]).unwrap();
        wf.complete().unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.progress(), 100.0);
        assert!(wf.completed_at.is_some());
        assert!(wf.total_duration_minutes.is_some());
        assert!(wf.total_duration_minutes.unwrap() >= 0);
    }

    #[test]
    fn complete_blocked_by_evidence_minimums() {
        let mut step = Step::new("install", "Install ONT", true);
        step.evidence_requirements = EvidenceRequirements {
            min_photos: 1,
            signature_required: false,
        };
        let mut wf = workflow(vec![step]);

        wf.complete_step("install", BTreeMap::new(), vec![]).unwrap();
        let err = wf.complete().unwrap_err();
        assert!(matches!(err, CoreError::IncompleteWorkflow(_)));

        // Attach the missing photo directly and retry
        wf.steps[0].add_evidence(Evidence::photo(BTreeMap::new()));
        wf.complete().unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
    }

    #[test]
    fn complete_requires_in_progress() {
        let mut wf = workflow(vec![]);
        let err = wf.complete().unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn cancel_is_terminal() {
        let mut wf = two_step_install();
        wf.start_step("survey").unwrap();
        wf.cancel(Some("work order withdrawn")).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Cancelled);
        assert_eq!(wf.cancel_reason.as_deref(), Some("work order withdrawn"));

        // No further mutation of a cancelled workflow
        assert!(wf.start_step("install").is_err());
        assert!(wf.cancel(None).is_err());
    }

    #[test]
    fn progress_counts_terminal_steps() {
        let mut wf = two_step_install();
        assert_eq!(wf.progress(), 0.0);
        wf.complete_step("survey", BTreeMap::new(), vec![]).unwrap();
        assert_eq!(wf.progress(), 50.0);
    }

    #[test]
    fn empty_workflow_reads_full_progress() {
        assert_eq!(workflow(vec![]).progress(), 100.0);
    }

    #[test]
    fn step_not_found() {
        let mut wf = two_step_install();
        assert!(matches!(
            wf.start_step("missing").unwrap_err(),
            CoreError::StepNotFound(_)
        ));
    }
}
