pub mod error;
pub mod provisioning;
pub mod step;
pub mod telemetry;
pub mod template;
pub mod tenant;
pub mod types;
pub mod workflow;

pub use error::{CoreError, Result};
