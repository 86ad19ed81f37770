use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use opsportal_core::provisioning::{ProvisioningRequest, ProvisioningStatus, ProvisioningTicket};
use opsportal_core::telemetry::{HealthReport, TenantEvent, TenantUsage};
use opsportal_core::template::WorkflowTemplate;
use opsportal_core::tenant::{PortalConfig, ResourceAllocation, Tenant, TenantPatch};
use opsportal_core::workflow::WorkflowInstance;

use crate::{ApiError, Result};

// ─── ApiClient ────────────────────────────────────────────────────────────

/// One instance per backend. Cheap to clone the inner `reqwest::Client`;
/// share the `ApiClient` behind an `Arc` when several controllers talk to
/// the same backend.
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Build with a per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http))
    }

    /// Build around a preconfigured client (auth headers, proxies, …).
    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── Tenants ──────────────────────────────────────────────────────────

    pub async fn get_tenant(&self, id: &str) -> Result<Tenant> {
        self.get_json(&format!("/tenants/{id}")).await
    }

    /// Full-record response: the backend's copy is authoritative and is
    /// expected to replace any optimistic local guess.
    pub async fn update_tenant(&self, id: &str, patch: &TenantPatch) -> Result<Tenant> {
        self.put_json(&format!("/tenants/{id}"), patch).await
    }

    pub async fn suspend_tenant(&self, id: &str, reason: &str) -> Result<()> {
        self.post_no_content(
            &format!("/tenants/{id}/suspend"),
            &serde_json::json!({ "reason": reason }),
        )
        .await
    }

    pub async fn resume_tenant(&self, id: &str) -> Result<()> {
        self.post_no_content(&format!("/tenants/{id}/resume"), &serde_json::json!({}))
            .await
    }

    pub async fn terminate_tenant(&self, id: &str) -> Result<()> {
        self.post_no_content(&format!("/tenants/{id}/terminate"), &serde_json::json!({}))
            .await
    }

    // ─── Provisioning ─────────────────────────────────────────────────────

    pub async fn provision_tenant(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisioningTicket> {
        self.post_json("/tenants/provision", request).await
    }

    pub async fn provisioning_status(&self, request_id: &str) -> Result<ProvisioningStatus> {
        self.get_json(&format!("/tenants/provision/{request_id}"))
            .await
    }

    // ─── Tenant sub-resources ─────────────────────────────────────────────

    pub async fn tenant_resources(&self, id: &str) -> Result<Vec<ResourceAllocation>> {
        self.get_json(&format!("/tenants/{id}/resources")).await
    }

    pub async fn tenant_usage(&self, id: &str) -> Result<TenantUsage> {
        self.get_json(&format!("/tenants/{id}/usage")).await
    }

    pub async fn portal_config(&self, id: &str) -> Result<PortalConfig> {
        self.get_json(&format!("/tenants/{id}/portal-config")).await
    }

    pub async fn tenant_health(&self, id: &str) -> Result<HealthReport> {
        self.get_json(&format!("/tenants/{id}/health")).await
    }

    pub async fn tenant_events(&self, id: &str) -> Result<Vec<TenantEvent>> {
        self.get_json(&format!("/tenants/{id}/events")).await
    }

    // ─── Field-ops workflows ──────────────────────────────────────────────

    pub async fn workflow_for_work_order(&self, work_order_id: &str) -> Result<WorkflowInstance> {
        self.get_json(&format!("/field-ops/workflows/work-order/{work_order_id}"))
            .await
    }

    pub async fn workflow_template(&self, template_id: &str) -> Result<WorkflowTemplate> {
        self.get_json(&format!("/field-ops/workflow-templates/{template_id}"))
            .await
    }

    pub async fn create_workflow(&self, workflow: &WorkflowInstance) -> Result<WorkflowInstance> {
        self.post_json("/field-ops/workflows", workflow).await
    }

    pub async fn save_workflow(&self, workflow: &WorkflowInstance) -> Result<WorkflowInstance> {
        self.put_json(&format!("/field-ops/workflows/{}", workflow.id), workflow)
            .await
    }

    // ─── Internal ─────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let resp = self.http.get(self.url(path)).send().await?;
        Self::decode(resp).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::decode(resp).await
    }

    async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "PUT");
        let resp = self.http.put(self.url(path)).json(body).send().await?;
        Self::decode(resp).await
    }

    /// For endpoints that only signal success; the response body is ignored.
    async fn post_no_content<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        debug!(path, "POST");
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::ensure_ok(resp).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let resp = Self::ensure_ok(resp).await?;
        Ok(resp.json().await?)
    }

    async fn ensure_ok(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
