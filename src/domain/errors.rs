//! Domain errors for the Warden supervision engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the Warden system.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input rejected at construction or call time; never auto-corrected.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// No tracked task has this id.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// The external instance manager failed a call.
    #[error("Instance manager call failed for {instance_id}: {reason}")]
    CollaboratorFailure { instance_id: String, reason: String },

    /// An event subscriber returned an error or panicked.
    #[error("Event handler {handler} failed: {reason}")]
    HandlerFault { handler: String, reason: String },
}

impl DomainError {
    /// Shorthand for a collaborator failure on one instance.
    pub fn collaborator(instance_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CollaboratorFailure {
            instance_id: instance_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from the validation layer.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }
}

/// Result alias used across the domain and service layers.
pub type DomainResult<T> = Result<T, DomainError>;

/// Reject confidence values outside `[0, 1]` (including NaN).
pub(crate) fn validate_confidence(confidence: f64) -> DomainResult<f64> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(DomainError::ValidationFailed(format!(
            "confidence must be within [0, 1], got {confidence}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_confidence_bounds() {
        assert!(validate_confidence(0.0).is_ok());
        assert!(validate_confidence(1.0).is_ok());
        assert!(validate_confidence(0.42).is_ok());
        assert!(validate_confidence(-0.01).is_err());
        assert!(validate_confidence(1.0001).is_err());
        assert!(validate_confidence(f64::NAN).is_err());
    }

    #[test]
    fn test_collaborator_display() {
        let err = DomainError::collaborator("inst-1", "connection refused");
        assert_eq!(
            err.to_string(),
            "Instance manager call failed for inst-1: connection refused"
        );
        assert!(!err.is_validation());
    }
}
