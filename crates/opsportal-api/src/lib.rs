//! `opsportal-api` — typed async REST client for the opsportal backend.
//!
//! Thin JSON-over-HTTP boundary: every method maps to one backend endpoint
//! and deserializes straight into the `opsportal-core` domain types.
//!
//! ```text
//! ApiClient
//!     │  reqwest::Client + base URL
//!     ▼
//! GET/POST/PUT  /tenants/… , /field-ops/…
//!     │  non-2xx → ApiError::Status { status, message }
//!     ▼
//! opsportal_core types (Tenant, WorkflowInstance, …)
//! ```
//!
//! Authentication is the embedding application's concern: build the
//! `reqwest::Client` with default headers and hand it to
//! [`ApiClient::with_client`].

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ApiError>;
