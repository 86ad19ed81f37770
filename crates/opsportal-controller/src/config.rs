use crate::error::Result;
use opsportal_api::ApiClient;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_secs: u64,
    #[serde(default = "default_events_poll_interval")]
    pub events_poll_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_auto_save_interval() -> u64 {
    30
}

fn default_events_poll_interval() -> u64 {
    60
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: default_request_timeout(),
            auto_save_interval_secs: default_auto_save_interval(),
            events_poll_interval_secs: default_events_poll_interval(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: ControllerConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs)
    }

    pub fn events_poll_interval(&self) -> Duration {
        Duration::from_secs(self.events_poll_interval_secs)
    }

    /// Build the API client this configuration describes.
    pub fn api_client(&self) -> Result<ApiClient> {
        Ok(ApiClient::with_timeout(
            &self.base_url,
            self.request_timeout(),
        )?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
