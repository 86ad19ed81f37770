use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use opsportal_api::ApiClient;
use opsportal_core::step::{Evidence, Step};
use opsportal_core::types::SyncStatus;
use opsportal_core::workflow::WorkflowInstance;
use opsportal_core::Result as CoreResult;

use crate::autosave::{self, AutosaveHandle};
use crate::guard::{Generation, UpdateSequence};

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub workflow: Option<WorkflowInstance>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Last backend-confirmed copy.
    pub(crate) confirmed: Option<WorkflowInstance>,
}

// ---------------------------------------------------------------------------
// WorkflowController
// ---------------------------------------------------------------------------

/// Lifecycle controller for one field-ops workflow bound to a work order.
///
/// Step operations are local-first: they run the core state machine, mark
/// the copy sync-pending, and leave persistence to an explicit [`save`],
/// the workflow-level transitions, or the auto-save loop. Guard failures
/// are captured into the error slot without any network call.
///
/// [`save`]: WorkflowController::save
pub struct WorkflowController {
    api: Arc<ApiClient>,
    state: Arc<RwLock<WorkflowState>>,
    generation: Generation,
    save_seq: UpdateSequence,
}

impl WorkflowController {
    pub fn new(api: ApiClient) -> Self {
        Self::with_shared(Arc::new(api))
    }

    pub fn with_shared(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(WorkflowState::default())),
            generation: Generation::default(),
            save_seq: UpdateSequence::default(),
        }
    }

    // ---------------------------------------------------------------------------
    // Loading and creation
    // ---------------------------------------------------------------------------

    /// Fetch the workflow attached to a work order.
    pub async fn load(&self, work_order_id: &str) {
        let generation = self.generation.bump();
        {
            let mut s = self.write();
            s.is_loading = true;
            s.error = None;
        }

        let result = self.api.workflow_for_work_order(work_order_id).await;

        let mut s = self.write();
        if !self.generation.is_current(generation) {
            return;
        }
        s.is_loading = false;
        match result {
            Ok(mut workflow) => {
                workflow.sync_status = SyncStatus::Synced;
                debug!(workflow = %workflow.id, work_order = work_order_id, "workflow loaded");
                s.confirmed = Some(workflow.clone());
                s.workflow = Some(workflow);
            }
            Err(e) => {
                warn!(work_order = work_order_id, error = %e, "workflow load failed");
                s.error = Some(format!(
                    "failed to load workflow for work order {work_order_id}: {e}"
                ));
            }
        }
    }

    /// Fetch a template, materialize a local instance for the work order,
    /// and persist it. The backend's copy (with its assigned id) replaces
    /// the local draft.
    pub async fn start_from_template(&self, template_id: &str, work_order_id: &str) {
        let generation = self.generation.bump();
        {
            let mut s = self.write();
            s.is_loading = true;
            s.error = None;
        }

        let result = async {
            let template = self.api.workflow_template(template_id).await?;
            let draft = template.materialize(work_order_id);
            self.api.create_workflow(&draft).await
        }
        .await;

        let mut s = self.write();
        if !self.generation.is_current(generation) {
            return;
        }
        s.is_loading = false;
        match result {
            Ok(mut workflow) => {
                workflow.sync_status = SyncStatus::Synced;
                debug!(workflow = %workflow.id, template = template_id, "workflow created");
                s.confirmed = Some(workflow.clone());
                s.workflow = Some(workflow);
            }
            Err(e) => {
                warn!(template = template_id, error = %e, "workflow creation failed");
                s.error = Some(format!(
                    "failed to start workflow from template {template_id}: {e}"
                ));
            }
        }
    }

    // ---------------------------------------------------------------------------
    // Step operations (local-first)
    // ---------------------------------------------------------------------------

    pub fn start_step(&self, step_id: &str) {
        self.mutate(|wf| wf.start_step(step_id));
    }

    pub fn complete_step(
        &self,
        step_id: &str,
        data: BTreeMap<String, serde_json::Value>,
        evidence: Vec<Evidence>,
    ) {
        self.mutate(|wf| wf.complete_step(step_id, data, evidence));
    }

    pub fn skip_step(&self, step_id: &str, reason: Option<&str>) {
        self.mutate(|wf| wf.skip_step(step_id, reason));
    }

    pub fn pause_step(&self, step_id: &str) {
        self.mutate(|wf| wf.pause_step(step_id));
    }

    pub fn fail_step(&self, step_id: &str, reason: &str) {
        self.mutate(|wf| wf.fail_step(step_id, reason));
    }

    fn mutate(&self, op: impl FnOnce(&mut WorkflowInstance) -> CoreResult<()>) {
        let mut s = self.write();
        let Some(workflow) = s.workflow.as_mut() else {
            s.error = Some("no workflow loaded".to_string());
            return;
        };
        match op(workflow) {
            Ok(()) => s.error = None,
            // The core state machine rejected the operation before any state
            // changed; no network call is made.
            Err(e) => s.error = Some(e.to_string()),
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Persist the current copy. The backend's response is adopted as the
    /// new confirmed copy; it also replaces the live copy unless a local
    /// mutation landed while the save was in flight.
    pub async fn save(&self) {
        let (snapshot, stamp, seq, generation) = {
            let s = self.read();
            let Some(workflow) = s.workflow.clone() else {
                return;
            };
            let stamp = workflow.last_modified;
            (
                workflow,
                stamp,
                self.save_seq.issue(),
                self.generation.current(),
            )
        };

        let result = self.api.save_workflow(&snapshot).await;

        let mut s = self.write();
        if !self.generation.is_current(generation) || !self.save_seq.is_latest(seq) {
            return;
        }
        match result {
            Ok(mut server) => {
                server.sync_status = SyncStatus::Synced;
                if Self::unchanged_since(&s, stamp) {
                    s.workflow = Some(server.clone());
                }
                s.confirmed = Some(server);
            }
            Err(e) => {
                warn!(workflow = %snapshot.id, error = %e, "workflow save failed");
                s.error = Some(format!("failed to save workflow {}: {e}", snapshot.id));
                if Self::unchanged_since(&s, stamp) {
                    if let Some(workflow) = s.workflow.as_mut() {
                        workflow.sync_status = SyncStatus::Error;
                    }
                }
            }
        }
    }

    /// One auto-save tick: persist iff the copy is sync-pending. Returns
    /// whether a save was attempted. Synced state causes no traffic, and a
    /// failed save stays in the error state until the next local mutation
    /// marks the copy pending again.
    pub async fn flush_pending(&self) -> bool {
        let pending = self
            .read()
            .workflow
            .as_ref()
            .is_some_and(|wf| wf.sync_status == SyncStatus::Pending);
        if !pending {
            return false;
        }
        self.save().await;
        true
    }

    /// Spawn the auto-save loop. The returned handle owns the task: drop it
    /// to stop auto-saving.
    pub fn start_autosave(self: &Arc<Self>, period: Duration) -> AutosaveHandle {
        autosave::spawn(Arc::clone(self), period)
    }

    // ---------------------------------------------------------------------------
    // Workflow-level transitions
    // ---------------------------------------------------------------------------

    /// Validate and complete the workflow, then persist immediately. The
    /// completion guard (required steps, evidence minimums) runs locally;
    /// a blocked completion makes no network call.
    pub async fn complete(&self) {
        if self.transitioned(|wf| wf.complete()) {
            self.save().await;
        }
    }

    pub async fn cancel(&self, reason: Option<&str>) {
        if self.transitioned(|wf| wf.cancel(reason)) {
            self.save().await;
        }
    }

    fn transitioned(&self, op: impl FnOnce(&mut WorkflowInstance) -> CoreResult<()>) -> bool {
        let mut s = self.write();
        let Some(workflow) = s.workflow.as_mut() else {
            s.error = Some("no workflow loaded".to_string());
            return false;
        };
        match op(workflow) {
            Ok(()) => {
                s.error = None;
                true
            }
            Err(e) => {
                s.error = Some(e.to_string());
                false
            }
        }
    }

    /// Clear every slot back to its initial empty value. Synchronous and
    /// idempotent.
    pub fn reset(&self) {
        self.generation.bump();
        *self.write() = WorkflowState::default();
    }

    // ---------------------------------------------------------------------------
    // Derived values
    // ---------------------------------------------------------------------------

    pub fn snapshot(&self) -> WorkflowState {
        self.read().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    pub fn progress(&self) -> f64 {
        self.read()
            .workflow
            .as_ref()
            .map(WorkflowInstance::progress)
            .unwrap_or(0.0)
    }

    pub fn current_step(&self) -> Option<Step> {
        self.read()
            .workflow
            .as_ref()
            .and_then(|wf| wf.current_step().cloned())
    }

    pub fn can_complete(&self) -> bool {
        self.read()
            .workflow
            .as_ref()
            .is_some_and(|wf| wf.completion_blockers().is_empty())
    }

    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.read().workflow.as_ref().map(|wf| wf.sync_status)
    }

    // ---------------------------------------------------------------------------
    // Internal
    // ---------------------------------------------------------------------------

    fn unchanged_since(s: &WorkflowState, stamp: DateTime<Utc>) -> bool {
        s.workflow
            .as_ref()
            .is_some_and(|wf| wf.last_modified == stamp)
    }

    fn read(&self) -> RwLockReadGuard<'_, WorkflowState> {
        self.state.read().expect("state lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorkflowState> {
        self.state.write().expect("state lock poisoned")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
