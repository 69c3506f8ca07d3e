//! Deterministic mock model backend
//!
//! Returns a fixed output or replays a scripted response sequence, never
//! performs I/O. Used by the factory when `use_mock_model` is set and
//! throughout the test suites for failure injection.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ModelClient, ModelOutput, ModelPrompt};
use crate::error::ModelError;
use crate::types::ComplianceStatus;

/// Deterministic in-process model client
pub struct MockModelClient {
    script: Mutex<VecDeque<Result<ModelOutput, ModelError>>>,
    fallthrough: Option<ModelOutput>,
    invocations: AtomicUsize,
}

impl MockModelClient {
    /// A client that always returns a compliant assessment
    pub fn compliant() -> Self {
        Self::fixed(Self::compliant_output())
    }

    /// A client that always returns the given output
    pub fn fixed(output: ModelOutput) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallthrough: Some(output),
            invocations: AtomicUsize::new(0),
        }
    }

    /// A client that replays the given responses in order
    ///
    /// Invocations beyond the script fail with a backend error, so a test
    /// that over-invokes fails loudly instead of passing by accident.
    pub fn scripted(script: Vec<Result<ModelOutput, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallthrough: None,
            invocations: AtomicUsize::new(0),
        }
    }

    /// The canonical compliant output used by `compliant()`
    pub fn compliant_output() -> ModelOutput {
        ModelOutput {
            assessment: Some(ComplianceStatus::Compliant),
            confidence: 0.92,
            violations: vec![],
            recommendations: vec![
                "Content reads as factual and free of outcome guarantees.".to_string(),
            ],
            raw: r#"{"assessment":"COMPLIANT","confidence":0.92}"#.to_string(),
        }
    }

    /// Number of invocations served so far
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(&self, _prompt: &ModelPrompt) -> Result<ModelOutput, ModelError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }

        match &self.fallthrough {
            Some(output) => Ok(output.clone()),
            None => Err(ModelError::Backend("mock script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> ModelPrompt {
        ModelPrompt {
            system: "s".into(),
            user: "u".into(),
        }
    }

    #[tokio::test]
    async fn test_compliant_client_is_deterministic() {
        let client = MockModelClient::compliant();
        let a = client.invoke(&prompt()).await.unwrap();
        let b = client.invoke(&prompt()).await.unwrap();
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.assessment, b.assessment);
        assert_eq!(client.invocations(), 2);
    }

    #[tokio::test]
    async fn test_scripted_sequence_in_order() {
        let client = MockModelClient::scripted(vec![
            Err(ModelError::Timeout { timeout_secs: 1 }),
            Ok(MockModelClient::compliant_output()),
        ]);

        assert!(client.invoke(&prompt()).await.is_err());
        assert!(client.invoke(&prompt()).await.is_ok());
        assert_eq!(client.invocations(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails_loudly() {
        let client = MockModelClient::scripted(vec![Ok(MockModelClient::compliant_output())]);
        client.invoke(&prompt()).await.unwrap();

        let err = client.invoke(&prompt()).await.unwrap_err();
        assert!(matches!(err, ModelError::Backend(_)));
        assert!(!err.is_transient());
    }
}
