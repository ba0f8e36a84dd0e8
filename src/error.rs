use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    /// The selected region contains no fillable controls.
    #[error("Selected area has no fillable controls: {0}")]
    EmptyScope(String),

    /// The user or the caller stopped the operation.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid profile: {0}")]
    ProfileError(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
