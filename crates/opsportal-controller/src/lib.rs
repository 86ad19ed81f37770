//! `opsportal-controller` — client-side lifecycle state containers for the
//! opsportal platform.
//!
//! A controller owns the in-memory copy of one entity (a tenant, or a
//! field-ops workflow bound to a work order), exposes action methods that
//! mutate that copy optimistically and persist through `opsportal-api`, and
//! computes read-only derived values from the current state. The backend
//! owns the durable copy; the local copy is possibly stale until its
//! `sync_status` reads synced.
//!
//! No operation surfaces an `Err` to the caller: remote and validation
//! failures are captured into the `error` state slot, and the consumer reads
//! state reactively through `snapshot()` and the derived getters. Three
//! guards keep concurrent use coherent:
//!
//! - a **generation counter**, bumped by load/refresh/reset, so responses
//!   from a superseded lifetime are discarded instead of clobbering state;
//! - an **update sequence**, so of two racing mutations only the latest
//!   issued may apply its response;
//! - a **confirmed copy** of the entity, restored when an optimistic
//!   mutation is rejected by the backend.

pub mod autosave;
pub mod config;
pub mod error;
pub mod events;
pub mod tenant;
pub mod workflow;

pub(crate) mod guard;

pub use autosave::AutosaveHandle;
pub use config::ControllerConfig;
pub use error::ControllerError;
pub use events::EventStream;
pub use tenant::{TenantController, TenantState};
pub use workflow::{WorkflowController, WorkflowState};
