//! Model client abstraction — provider-agnostic generative-model access
//!
//! A `ModelClient` turns a prompt into structured output. Output is
//! untrusted: it is parsed and re-validated here before any other module
//! sees it. `ModelRunner` layers the retry/backoff/fallback policy on top
//! of any client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ModelError;
use crate::types::{ComplianceStatus, Severity, Violation};

pub mod http;
pub mod mock;

pub use http::HttpModelClient;
pub use mock::MockModelClient;

/// Prompt assembled by the pipeline for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrompt {
    /// Instructions plus embedded knowledge context
    pub system: String,

    /// The content under review
    pub user: String,
}

/// Validated structured output from a model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutput {
    /// The model's own compliance judgment, if it gave one
    #[serde(default)]
    pub assessment: Option<ComplianceStatus>,

    /// Model self-confidence in [0, 1]
    pub confidence: f64,

    #[serde(default)]
    pub violations: Vec<Violation>,

    #[serde(default)]
    pub recommendations: Vec<String>,

    /// Raw model text, retained for verbose audit detail only
    #[serde(skip)]
    pub raw: String,
}

/// Wire shape the model is asked to produce
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOutput {
    #[serde(default)]
    assessment: Option<ComplianceStatus>,
    confidence: f64,
    #[serde(default)]
    violations: Vec<WireViolation>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireViolation {
    rule_id: String,
    description: String,
    severity: Severity,
    #[serde(default)]
    matched_span: Option<(usize, usize)>,
}

/// Parse and re-validate untrusted model text against the output schema
///
/// Malformed output is a `ModelError`, never propagated as data.
pub fn parse_model_output(raw: &str) -> Result<ModelOutput, ModelError> {
    let wire: WireOutput =
        serde_json::from_str(raw.trim()).map_err(|e| ModelError::MalformedOutput {
            reason: format!("output is not valid result JSON: {}", e),
        })?;

    if !(0.0..=1.0).contains(&wire.confidence) {
        return Err(ModelError::MalformedOutput {
            reason: format!("confidence {} outside [0, 1]", wire.confidence),
        });
    }

    Ok(ModelOutput {
        assessment: wire.assessment,
        confidence: wire.confidence,
        violations: wire
            .violations
            .into_iter()
            .map(|v| Violation {
                rule_id: v.rule_id,
                description: v.description,
                severity: v.severity,
                matched_span: v.matched_span,
            })
            .collect(),
        recommendations: wire.recommendations,
        raw: raw.to_string(),
    })
}

/// Core trait for model backends
///
/// Implementations handle transport and provider-specific wire formats;
/// retry policy lives in `ModelRunner`, not in the clients.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Invoke the model once with the given prompt
    async fn invoke(&self, prompt: &ModelPrompt) -> Result<ModelOutput, ModelError>;

    /// Backend name (e.g., "mock", "openai", "anthropic")
    fn name(&self) -> &str;
}

/// One recorded retry, for the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    /// 1-based retry index
    pub attempt: u32,

    /// The transient error that triggered this retry
    pub error: String,

    /// Backoff applied before the retry
    pub backoff_ms: u64,
}

/// Result of a full invocation including retry history
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub output: ModelOutput,
    pub attempts: Vec<RetryAttempt>,

    /// True when the output is the deterministic placeholder produced
    /// after retry exhaustion
    pub fallback_used: bool,
}

/// Terminal invocation failure, still carrying the retry history
///
/// The attempts made before giving up belong in the audit trail even
/// when the run ends in an error.
#[derive(Debug)]
pub struct InvocationFailure {
    pub error: ModelError,
    pub attempts: Vec<RetryAttempt>,
}

/// Retry/backoff/fallback wrapper around any `ModelClient`
///
/// Transient errors retry up to `max_retries` with exponential backoff
/// (`base * 2^attempt`); permanent errors fail immediately. When fallback
/// is enabled, retry exhaustion yields a placeholder output flagged in the
/// report so the pipeline can finish with REQUIRES_REVIEW instead of
/// failing the caller.
pub struct ModelRunner {
    client: Arc<dyn ModelClient>,
    max_retries: u32,
    backoff_base: Duration,
    timeout: Duration,
    fallback_enabled: bool,
}

impl ModelRunner {
    pub fn new(
        client: Arc<dyn ModelClient>,
        max_retries: u32,
        backoff_base: Duration,
        timeout: Duration,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            client,
            max_retries,
            backoff_base,
            timeout,
            fallback_enabled,
        }
    }

    /// Backend name of the wrapped client
    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Invoke with the configured retry policy
    pub async fn run(&self, prompt: &ModelPrompt) -> Result<InvocationReport, InvocationFailure> {
        let mut attempts: Vec<RetryAttempt> = Vec::new();

        for attempt in 0..=self.max_retries {
            let result = match tokio::time::timeout(self.timeout, self.client.invoke(prompt)).await
            {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }),
            };

            match result {
                Ok(output) => {
                    return Ok(InvocationReport {
                        output,
                        attempts,
                        fallback_used: false,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = self.backoff_base * 2u32.pow(attempt);
                    tracing::warn!(
                        backend = self.client.name(),
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient model error, retrying"
                    );
                    attempts.push(RetryAttempt {
                        attempt: attempt + 1,
                        error: e.to_string(),
                        backoff_ms: backoff.as_millis() as u64,
                    });
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_transient() => {
                    // Retries exhausted
                    if self.fallback_enabled {
                        tracing::warn!(
                            backend = self.client.name(),
                            error = %e,
                            "Retries exhausted, returning placeholder output"
                        );
                        return Ok(InvocationReport {
                            output: placeholder_output(),
                            attempts,
                            fallback_used: true,
                        });
                    }
                    return Err(InvocationFailure { error: e, attempts });
                }
                Err(e) => {
                    tracing::error!(
                        backend = self.client.name(),
                        error = %e,
                        "Permanent model error, not retrying"
                    );
                    return Err(InvocationFailure { error: e, attempts });
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}

/// Deterministic placeholder produced after retry exhaustion
///
/// Deliberately non-committal: zero confidence and an explicit review
/// recommendation, never a fabricated compliant answer.
fn placeholder_output() -> ModelOutput {
    ModelOutput {
        assessment: Some(ComplianceStatus::RequiresReview),
        confidence: 0.0,
        violations: vec![],
        recommendations: vec![
            "Automated analysis was unavailable; route this content to manual review."
                .to_string(),
        ],
        raw: String::new(),
    }
}
