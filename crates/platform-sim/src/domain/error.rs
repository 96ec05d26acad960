use std::fmt;

use thiserror::Error;

/// Kind of resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Instance,
    Job,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Instance => f.write_str("Instance"),
            ResourceKind::Job => f.write_str("Job"),
        }
    }
}

/// Errors reported synchronously by platform operations
///
/// `NotFound` is returned both for unknown ids and for resources owned by
/// another user so callers cannot probe for existence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlatformError {
    #[error("Invalid or missing access token")]
    Unauthorized,

    #[error("{kind} not found or access denied: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Exceeds GPU quota. Requested: {requested}, available: {available}")]
    QuotaExceeded { requested: u32, available: u32 },

    #[error("Precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl PlatformError {
    pub fn instance_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Instance,
            id: id.into(),
        }
    }

    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Job,
            id: id.into(),
        }
    }

    /// Short machine readable name used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::Unauthorized => "unauthorized",
            PlatformError::NotFound { .. } => "not_found",
            PlatformError::QuotaExceeded { .. } => "quota_exceeded",
            PlatformError::PreconditionFailed { .. } => "precondition_failed",
            PlatformError::Conflict { .. } => "conflict",
            PlatformError::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;
