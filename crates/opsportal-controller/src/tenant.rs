use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, warn};

use opsportal_api::ApiClient;
use opsportal_core::provisioning::{ProvisioningRequest, ProvisioningStatus};
use opsportal_core::telemetry::{HealthReport, TenantEvent, TenantUsage};
use opsportal_core::tenant::{
    resource_utilization, PortalConfig, ResourceAllocation, Tenant, TenantPatch,
};
use opsportal_core::types::{SyncStatus, TenantStatus};

use crate::events::{self, EventStream};
use crate::guard::{Generation, UpdateSequence};

// ---------------------------------------------------------------------------
// TenantState
// ---------------------------------------------------------------------------

/// Everything the controller holds for one tenant. Cloned out wholesale by
/// [`TenantController::snapshot`]; consumers read it, never mutate it.
#[derive(Debug, Clone, Default)]
pub struct TenantState {
    pub tenant: Option<Tenant>,
    pub resources: Vec<ResourceAllocation>,
    pub usage: Option<TenantUsage>,
    pub portal_config: Option<PortalConfig>,
    pub health: Option<HealthReport>,
    pub events: Vec<TenantEvent>,
    pub provisioning: Option<ProvisioningStatus>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Last backend-confirmed copy, restored when an optimistic update is
    /// rejected.
    pub(crate) confirmed: Option<Tenant>,
}

// ---------------------------------------------------------------------------
// TenantController
// ---------------------------------------------------------------------------

/// Lifecycle controller for one tenant at a time.
///
/// All operations capture failures into [`TenantState::error`] instead of
/// returning them; see the crate docs for the staleness guards.
pub struct TenantController {
    api: Arc<ApiClient>,
    state: Arc<RwLock<TenantState>>,
    generation: Generation,
    update_seq: UpdateSequence,
}

impl TenantController {
    pub fn new(api: ApiClient) -> Self {
        Self::with_shared(Arc::new(api))
    }

    pub fn with_shared(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(TenantState::default())),
            generation: Generation::default(),
            update_seq: UpdateSequence::default(),
        }
    }

    // ---------------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------------

    /// Fetch a tenant by id, replacing the loaded entity on success. On
    /// failure the previous entity (if any) is left untouched and the error
    /// is recorded.
    pub async fn load(&self, id: &str) {
        let generation = self.generation.bump();
        {
            let mut s = self.write();
            s.is_loading = true;
            s.error = None;
        }

        let result = self.api.get_tenant(id).await;

        let mut s = self.write();
        if !self.generation.is_current(generation) {
            return; // superseded by a newer load or a reset
        }
        s.is_loading = false;
        match result {
            Ok(mut tenant) => {
                tenant.sync_status = SyncStatus::Synced;
                debug!(tenant = %tenant.id, "tenant loaded");
                s.confirmed = Some(tenant.clone());
                s.tenant = Some(tenant);
            }
            Err(e) => {
                warn!(tenant = id, error = %e, "tenant load failed");
                s.error = Some(format!("failed to load tenant {id}: {e}"));
            }
        }
    }

    /// Optimistically apply a partial update, then persist it. The backend's
    /// response is authoritative and replaces the optimistic guess; a
    /// rejected update restores the last confirmed copy.
    pub async fn update(&self, patch: TenantPatch) {
        let (id, seq, generation) = {
            let mut s = self.write();
            let Some(tenant) = s.tenant.as_mut() else {
                return; // nothing loaded: no-op
            };
            let id = tenant.id.clone();
            tenant.apply(&patch);
            s.error = None;
            (id, self.update_seq.issue(), self.generation.current())
        };

        let result = self.api.update_tenant(&id, &patch).await;

        let mut s = self.write();
        if !self.generation.is_current(generation) || !self.update_seq.is_latest(seq) {
            return; // a newer mutation or lifetime owns the outcome
        }
        match result {
            Ok(mut server) => {
                server.sync_status = SyncStatus::Synced;
                s.confirmed = Some(server.clone());
                s.tenant = Some(server);
            }
            Err(e) => {
                warn!(tenant = %id, error = %e, "tenant update rejected; rolling back");
                s.error = Some(format!("failed to update tenant {id}: {e}"));
                s.tenant = s.confirmed.clone();
            }
        }
    }

    pub async fn suspend(&self, reason: &str) {
        self.transition(TenantStatus::Suspended, Some(reason)).await;
    }

    pub async fn resume(&self) {
        self.transition(TenantStatus::Active, None).await;
    }

    pub async fn terminate(&self) {
        self.transition(TenantStatus::Terminated, None).await;
    }

    /// Fire-and-confirm: the remote call goes first, and on success the
    /// local status field is set directly rather than read back from the
    /// response. Guard failures never reach the network.
    async fn transition(&self, target: TenantStatus, reason: Option<&str>) {
        let (id, generation) = {
            let mut s = self.write();
            let id = {
                let Some(tenant) = s.tenant.as_ref() else {
                    s.error = Some("no tenant loaded".to_string());
                    return;
                };
                if let Err(e) = tenant.ensure_transition(target) {
                    s.error = Some(e.to_string());
                    return;
                }
                tenant.id.clone()
            };
            s.error = None;
            (id, self.generation.current())
        };

        let result = match target {
            TenantStatus::Suspended => {
                self.api.suspend_tenant(&id, reason.unwrap_or_default()).await
            }
            TenantStatus::Active => self.api.resume_tenant(&id).await,
            TenantStatus::Terminated => self.api.terminate_tenant(&id).await,
            TenantStatus::Provisioning => return, // never a remote transition
        };

        let mut s = self.write();
        if !self.generation.is_current(generation) {
            return;
        }
        match result {
            Ok(()) => {
                debug!(tenant = %id, status = %target, "tenant transitioned");
                if let Some(tenant) = s.tenant.as_mut() {
                    tenant.set_status(target);
                }
                if let Some(confirmed) = s.confirmed.as_mut() {
                    confirmed.set_status(target);
                }
            }
            Err(e) => {
                warn!(tenant = %id, status = %target, error = %e, "tenant transition failed");
                s.error = Some(format!("failed to move tenant {id} to {target}: {e}"));
            }
        }
    }

    /// Submit a provisioning request. Returns the request id to poll with,
    /// or `None` with the error captured. The loaded entity is not touched.
    pub async fn provision(&self, request: &ProvisioningRequest) -> Option<String> {
        if let Err(e) = request.validate() {
            self.write().error = Some(e.to_string());
            return None;
        }
        self.write().error = None;

        match self.api.provision_tenant(request).await {
            Ok(ticket) => {
                debug!(request_id = %ticket.request_id, "provisioning submitted");
                Some(ticket.request_id)
            }
            Err(e) => {
                warn!(error = %e, "provisioning request failed");
                self.write().error = Some(format!("provisioning request failed: {e}"));
                None
            }
        }
    }

    /// Fetch provisioning progress into its own state slot, distinct from
    /// the loaded entity.
    pub async fn poll_provisioning(&self, request_id: &str) {
        let generation = self.generation.current();
        self.write().error = None;

        let result = self.api.provisioning_status(request_id).await;

        let mut s = self.write();
        if !self.generation.is_current(generation) {
            return;
        }
        match result {
            Ok(status) => s.provisioning = Some(status),
            Err(e) => {
                s.error = Some(format!(
                    "failed to poll provisioning request {request_id}: {e}"
                ));
            }
        }
    }

    /// Re-fetch the entity and every sub-resource concurrently. Each fetch
    /// settles on its own: one failing does not discard the others, and the
    /// failures are summarized into the error slot.
    pub async fn refresh(&self) {
        let Some(id) = self.read().tenant.as_ref().map(|t| t.id.clone()) else {
            self.write().error = Some("no tenant loaded".to_string());
            return;
        };

        let generation = self.generation.bump();
        {
            let mut s = self.write();
            s.is_loading = true;
            s.error = None;
        }

        let (tenant, resources, usage, portal_config, health, events) = tokio::join!(
            self.api.get_tenant(&id),
            self.api.tenant_resources(&id),
            self.api.tenant_usage(&id),
            self.api.portal_config(&id),
            self.api.tenant_health(&id),
            self.api.tenant_events(&id),
        );

        let mut s = self.write();
        if !self.generation.is_current(generation) {
            return;
        }
        s.is_loading = false;

        let mut failures = Vec::new();
        match tenant {
            Ok(mut t) => {
                t.sync_status = SyncStatus::Synced;
                s.confirmed = Some(t.clone());
                s.tenant = Some(t);
            }
            Err(e) => failures.push(format!("tenant: {e}")),
        }
        match resources {
            Ok(r) => s.resources = r,
            Err(e) => failures.push(format!("resources: {e}")),
        }
        match usage {
            Ok(u) => s.usage = Some(u),
            Err(e) => failures.push(format!("usage: {e}")),
        }
        match portal_config {
            Ok(c) => s.portal_config = Some(c),
            Err(e) => failures.push(format!("portal config: {e}")),
        }
        match health {
            Ok(h) => s.health = Some(h),
            Err(e) => failures.push(format!("health: {e}")),
        }
        match events {
            Ok(ev) => s.events = ev,
            Err(e) => failures.push(format!("events: {e}")),
        }

        if !failures.is_empty() {
            warn!(tenant = %id, "refresh incomplete: {}", failures.join("; "));
            s.error = Some(format!("refresh incomplete: {}", failures.join("; ")));
        }
    }

    /// Clear every slot back to its initial empty value. Synchronous and
    /// idempotent; responses still in flight land stale and are discarded.
    pub fn reset(&self) {
        self.generation.bump();
        *self.write() = TenantState::default();
    }

    /// Poll the tenant's event feed on an interval, yielding each event
    /// once. The poller stops when the stream is dropped.
    pub fn watch_events(&self, poll_interval: Duration) -> EventStream {
        match self.read().tenant.as_ref().map(|t| t.id.clone()) {
            Some(id) => events::spawn(Arc::clone(&self.api), id, poll_interval),
            None => EventStream::empty(),
        }
    }

    // ---------------------------------------------------------------------------
    // Derived values (computed on read, never stored)
    // ---------------------------------------------------------------------------

    pub fn snapshot(&self) -> TenantState {
        self.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn is_active(&self) -> bool {
        self.read().tenant.as_ref().is_some_and(Tenant::is_active)
    }

    pub fn can_manage(&self) -> bool {
        self.read().tenant.as_ref().is_some_and(Tenant::can_manage)
    }

    pub fn is_healthy(&self) -> bool {
        self.read()
            .health
            .as_ref()
            .is_some_and(HealthReport::is_healthy)
    }

    pub fn resource_utilization(&self) -> BTreeMap<String, f64> {
        resource_utilization(&self.read().resources)
    }

    // ---------------------------------------------------------------------------
    // Internal
    // ---------------------------------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, TenantState> {
        self.state.read().expect("state lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, TenantState> {
        self.state.write().expect("state lock poisoned")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn tenant_json(id: &str, name: &str, status: &str) -> String {
        format!(
            r#"{{
                "id": "{id}",
                "name": "{name}",
                "slug": "acme-fiber",
                "tier": "basic",
                "status": "{status}",
                "created_at": "2026-07-01T08:00:00Z",
                "last_modified": "2026-08-01T10:00:00Z"
            }}"#
        )
    }

    async fn loaded_controller(server: &mut ServerGuard, status: &str) -> TenantController {
        server
            .mock("GET", "/tenants/t-1")
            .with_status(200)
            .with_body(tenant_json("t-1", "Acme Fiber", status))
            .create_async()
            .await;
        let controller = TenantController::new(ApiClient::new(server.url()));
        controller.load("t-1").await;
        assert!(controller.error().is_none());
        controller
    }

    #[tokio::test]
    async fn load_replaces_entity_and_marks_synced() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        let state = controller.snapshot();
        let tenant = state.tenant.unwrap();
        assert_eq!(tenant.id, "t-1");
        assert_eq!(tenant.sync_status, SyncStatus::Synced);
        assert!(!state.is_loading);
        assert!(controller.is_active());
        assert!(controller.can_manage());
    }

    #[tokio::test]
    async fn load_failure_preserves_prior_entity() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        server
            .mock("GET", "/tenants/t-2")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;
        controller.load("t-2").await;

        let state = controller.snapshot();
        assert_eq!(state.tenant.unwrap().id, "t-1");
        assert!(state.error.unwrap().contains("t-2"));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn update_without_entity_is_noop() {
        let server = Server::new_async().await;
        let controller = TenantController::new(ApiClient::new(server.url()));
        controller
            .update(TenantPatch {
                name: Some("X".into()),
                ..Default::default()
            })
            .await;

        let state = controller.snapshot();
        assert!(state.tenant.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn update_adopts_server_response() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        server
            .mock("PUT", "/tenants/t-1")
            .match_body(Matcher::Json(serde_json::json!({ "name": "Acme Fiber Co" })))
            .with_status(200)
            .with_body(tenant_json("t-1", "Acme Fiber Company", "active"))
            .create_async()
            .await;

        controller
            .update(TenantPatch {
                name: Some("Acme Fiber Co".into()),
                ..Default::default()
            })
            .await;

        let tenant = controller.snapshot().tenant.unwrap();
        // The backend's copy wins over the optimistic guess
        assert_eq!(tenant.name, "Acme Fiber Company");
        assert_eq!(tenant.sync_status, SyncStatus::Synced);
        assert!(controller.error().is_none());
    }

    #[tokio::test]
    async fn rejected_update_rolls_back_to_confirmed() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        server
            .mock("PUT", "/tenants/t-1")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        controller
            .update(TenantPatch {
                name: Some("Doomed Rename".into()),
                ..Default::default()
            })
            .await;

        let state = controller.snapshot();
        let tenant = state.tenant.unwrap();
        assert_eq!(tenant.name, "Acme Fiber");
        assert_eq!(tenant.sync_status, SyncStatus::Synced);
        assert!(state.error.unwrap().contains("failed to update"));
    }

    #[tokio::test]
    async fn suspend_sets_status_directly() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        let mock = server
            .mock("POST", "/tenants/t-1/suspend")
            .match_body(Matcher::Json(serde_json::json!({ "reason": "unpaid" })))
            .with_status(200)
            .create_async()
            .await;

        controller.suspend("unpaid").await;
        mock.assert_async().await;

        let tenant = controller.snapshot().tenant.unwrap();
        assert_eq!(tenant.status, TenantStatus::Suspended);
        assert!(!controller.is_active());
        assert!(controller.can_manage());
    }

    #[tokio::test]
    async fn invalid_transition_never_hits_network() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "terminated").await;

        let mock = server
            .mock("POST", "/tenants/t-1/suspend")
            .expect(0)
            .create_async()
            .await;

        controller.suspend("unpaid").await;
        mock.assert_async().await;

        let state = controller.snapshot();
        assert_eq!(state.tenant.unwrap().status, TenantStatus::Terminated);
        assert!(state.error.unwrap().contains("invalid transition"));
    }

    #[tokio::test]
    async fn failed_transition_keeps_local_status() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        server
            .mock("POST", "/tenants/t-1/terminate")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        controller.terminate().await;

        let state = controller.snapshot();
        assert_eq!(state.tenant.unwrap().status, TenantStatus::Active);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn provision_returns_request_id() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tenants/provision")
            .with_status(200)
            .with_body(r#"{"request_id":"req-9"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/tenants/provision/req-9")
            .with_status(200)
            .with_body(
                r#"{"request_id":"req-9","status":"running","updated_at":"2026-08-01T10:00:00Z"}"#,
            )
            .create_async()
            .await;

        let controller = TenantController::new(ApiClient::new(server.url()));
        let request = ProvisioningRequest {
            name: "Acme".into(),
            slug: "acme".into(),
            tier: "basic".into(),
            admin_user: opsportal_core::provisioning::AdminUser {
                email: "a@acme.com".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            },
        };

        let request_id = controller.provision(&request).await.unwrap();
        assert_eq!(request_id, "req-9");
        // The loaded entity slot is untouched by provisioning
        assert!(controller.snapshot().tenant.is_none());

        controller.poll_provisioning(&request_id).await;
        let provisioning = controller.snapshot().provisioning.unwrap();
        assert_eq!(provisioning.request_id, "req-9");
    }

    #[tokio::test]
    async fn invalid_provision_request_short_circuits() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/tenants/provision")
            .expect(0)
            .create_async()
            .await;

        let controller = TenantController::new(ApiClient::new(server.url()));
        let request = ProvisioningRequest {
            name: "Acme".into(),
            slug: "Bad Slug".into(),
            tier: "basic".into(),
            admin_user: opsportal_core::provisioning::AdminUser {
                email: "a@acme.com".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            },
        };

        assert!(controller.provision(&request).await.is_none());
        assert!(controller.error().unwrap().contains("invalid slug"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_settles_each_fetch_independently() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        server
            .mock("GET", "/tenants/t-1/resources")
            .with_status(200)
            .with_body(r#"[{"type":"cpu","allocated":100.0,"used":50.0}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/tenants/t-1/usage")
            .with_status(500)
            .with_body("usage store down")
            .create_async()
            .await;
        server
            .mock("GET", "/tenants/t-1/portal-config")
            .with_status(200)
            .with_body(r#"{"locale":"en-GB"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/tenants/t-1/health")
            .with_status(200)
            .with_body(r#"{"overall":"healthy","checks":[],"checked_at":"2026-08-01T10:00:00Z"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/tenants/t-1/events")
            .with_status(200)
            .with_body(
                r#"[{"id":"ev-1","kind":"suspend","message":"suspended for billing","occurred_at":"2026-08-01T09:00:00Z"}]"#,
            )
            .create_async()
            .await;

        controller.refresh().await;

        let state = controller.snapshot();
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.portal_config.unwrap().locale, "en-GB");
        assert_eq!(state.events.len(), 1);
        assert!(state.usage.is_none());
        assert!(state.error.unwrap().contains("usage"));

        assert!(controller.is_healthy());
        assert_eq!(controller.resource_utilization()["cpu"], 50.0);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let mut server = Server::new_async().await;
        let controller = loaded_controller(&mut server, "active").await;

        controller.reset();
        let once = controller.snapshot();
        assert!(once.tenant.is_none());
        assert!(once.error.is_none());
        assert!(!once.is_loading);
        assert!(once.resources.is_empty());

        controller.reset();
        let twice = controller.snapshot();
        assert!(twice.tenant.is_none());
        assert!(twice.error.is_none());
        assert!(twice.events.is_empty());
        assert!(twice.provisioning.is_none());
    }

    #[tokio::test]
    async fn derived_values_without_entity() {
        let server = Server::new_async().await;
        let controller = TenantController::new(ApiClient::new(server.url()));
        assert!(!controller.is_active());
        assert!(!controller.can_manage());
        assert!(!controller.is_healthy());
        assert!(controller.resource_utilization().is_empty());
    }
}
