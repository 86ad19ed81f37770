use thiserror::Error;

/// Setup-time failures (configuration, client construction). Runtime
/// failures never reach the caller — controllers capture them into state.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Api(#[from] opsportal_api::ApiError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
