//! Error types for lexguard
//!
//! Only `Validation` and `AgentExecution` ever reach the caller of a
//! pipeline check; everything else is handled internally (degradation,
//! retry, audit fallback) and encoded in the result instead.

use thiserror::Error;

/// Errors that can occur in the compliance pipeline
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// Malformed request or configuration value — fails fast, never retried
    #[error("Validation failed for field '{field}': {reason}")]
    Validation {
        field: String,
        reason: String,
    },

    /// Model invocation failure (transient or permanent)
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Model retries/fallback exhausted — surfaced to the caller with a
    /// generic message; technical detail lives in the audit trail
    #[error("Analysis unavailable, retry later")]
    AgentExecution,

    /// Configuration error detected at factory-build time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Knowledge source failure — internal only, the aggregator degrades
    /// to defaults instead of propagating this upward
    #[error("Knowledge source '{provider}' failed: {reason}")]
    Knowledge {
        provider: String,
        reason: String,
    },

    /// Audit sink failure — always caught and diverted to the fallback
    /// buffer, never propagated to the caller
    #[error("Audit sink error: {0}")]
    Audit(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a model backend
///
/// `is_transient()` drives the retry policy: timeouts and rate limits are
/// retried with exponential backoff, everything else fails immediately.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invocation exceeded the configured timeout (transient)
    #[error("Model call timed out after {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
    },

    /// Backend rejected the call due to rate limiting (transient)
    #[error("Model rate-limited: {0}")]
    RateLimited(String),

    /// Authentication/authorization failure (permanent)
    #[error("Model authentication failed: {0}")]
    Auth(String),

    /// Backend rejected the request as malformed (permanent)
    #[error("Model rejected request: {0}")]
    BadRequest(String),

    /// Model returned output that failed schema re-validation (permanent)
    #[error("Model output failed validation: {reason}")]
    MalformedOutput {
        reason: String,
    },

    /// Transport-level failure reaching the backend (transient)
    #[error("Model transport error: {0}")]
    Transport(String),

    /// Backend-specific failure not covered above (permanent)
    #[error("Model backend error: {0}")]
    Backend(String),
}

impl ModelError {
    /// Whether the retry policy may re-attempt after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Timeout { .. } | ModelError::RateLimited(_) | ModelError::Transport(_)
        )
    }
}

impl ComplianceError {
    /// Shorthand for a field-level validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ComplianceError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ComplianceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::Timeout { timeout_secs: 30 }.is_transient());
        assert!(ModelError::RateLimited("429".into()).is_transient());
        assert!(ModelError::Transport("connection reset".into()).is_transient());

        assert!(!ModelError::Auth("bad key".into()).is_transient());
        assert!(!ModelError::BadRequest("missing field".into()).is_transient());
        assert!(
            !ModelError::MalformedOutput {
                reason: "not json".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_agent_execution_message_is_generic() {
        // The caller-facing message must not leak technical detail
        let msg = ComplianceError::AgentExecution.to_string();
        assert_eq!(msg, "Analysis unavailable, retry later");
    }

    #[test]
    fn test_knowledge_error_names_the_provider() {
        let err = ComplianceError::Knowledge {
            provider: "file".into(),
            reason: "data directory missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "Knowledge source 'file' failed: data directory missing"
        );
        // Struct field, not an error chain: nothing to walk upward
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_validation_shorthand() {
        let err = ComplianceError::validation("content", "must not be empty");
        assert!(err.to_string().contains("content"));
        assert!(err.to_string().contains("must not be empty"));
    }
}
