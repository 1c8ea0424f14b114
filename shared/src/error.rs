//! Error taxonomy shared by the workflow engine, the sync adapters and the
//! view controller.

use thiserror::Error;

/// Failure of a calendar workflow or sync operation.
///
/// Every variant except `Internal` carries a message that is safe to show
/// to the user verbatim. `Internal` wraps infrastructure failures (storage
/// unreachable and the like) which are logged and shown generically.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Bad input shape or range
    #[error("{0}")]
    Validation(String),

    /// Event or source missing (or soft-deleted)
    #[error("{0} not found")]
    NotFound(String),

    /// Transition not allowed from the current status
    #[error("{0}")]
    InvalidState(String),

    /// Actor lacks permission, including self-confirmation and edits of
    /// read-only rows
    #[error("{0}")]
    Forbidden(String),

    /// Lost a concurrent state race; the caller should refresh
    #[error("{0}")]
    Conflict(String),

    /// External calendar fetch or parse failure, scoped to one source
    #[error("{0}")]
    UpstreamFetch(String),

    /// Missing or malformed configuration such as the encryption key
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected infrastructure failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        WorkflowError::NotFound(resource.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        WorkflowError::InvalidState(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        WorkflowError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        WorkflowError::Conflict(message.into())
    }

    /// Stable machine-readable code for API bodies and UI lookups.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::InvalidState(_) => "invalid_state",
            WorkflowError::Forbidden(_) => "forbidden",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::UpstreamFetch(_) => "upstream_fetch_error",
            WorkflowError::Configuration(_) => "configuration_error",
            WorkflowError::Internal(_) => "internal_error",
        }
    }

    /// Message for the user; infrastructure detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Internal(_) | WorkflowError::Configuration(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_shown_generically() {
        let err = WorkflowError::from(anyhow::anyhow!("connection refused"));
        assert_eq!(err.code(), "internal_error");
        assert!(!err.user_message().contains("connection refused"));
    }

    #[test]
    fn taxonomy_messages_are_shown_verbatim() {
        let err = WorkflowError::forbidden("You cannot confirm your own proposal");
        assert_eq!(err.code(), "forbidden");
        assert_eq!(err.user_message(), "You cannot confirm your own proposal");
        assert_eq!(WorkflowError::not_found("Event").to_string(), "Event not found");
    }
}
