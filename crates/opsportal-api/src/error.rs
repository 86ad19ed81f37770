use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, timeout, or body-decoding failure from the HTTP layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl ApiError {
    /// Status code of a rejected request, if this was a backend rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}
