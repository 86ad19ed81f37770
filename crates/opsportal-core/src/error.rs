use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("step '{step}' cannot start: dependency '{missing}' is not completed")]
    DependencyNotMet { step: String, missing: String },

    #[error("step '{0}' is required and cannot be skipped")]
    RequiredStep(String),

    #[error("step '{0}' is not in progress")]
    StepNotInProgress(String),

    #[error("step '{0}' is not pending")]
    StepNotPending(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("workflow cannot complete: {0}")]
    IncompleteWorkflow(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid provisioning request: {0}")]
    InvalidProvisioningRequest(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
