// SPDX-License-Identifier: MIT

/// Failure of a single registry call, classified so that callers can
/// decide on a retry policy per kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("function not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("request rejected by the registry: {0}")]
    ValidationRejected(String),
    #[error("rate limited by the registry")]
    RateLimited,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl RegistryError {
    /// Rate limits and transport failures are transient; everything else
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::RateLimited | RegistryError::Transport(_))
    }
}
