//! Pipeline configuration
//!
//! One explicit `PipelineConfiguration` struct, constructed programmatically
//! or read from the environment exactly once via `from_env()`. No other
//! module reads ambient state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ComplianceError, Result};
use crate::types::{AuditDetailLevel, Jurisdiction};

/// Model backend selector
///
/// Resolved once at factory-build time through a static dispatch table;
/// never matched on as a string at call sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProviderKind {
    #[default]
    Mock,
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for ModelProviderKind {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(ModelProviderKind::Mock),
            "openai" => Ok(ModelProviderKind::OpenAi),
            "anthropic" => Ok(ModelProviderKind::Anthropic),
            other => Err(ComplianceError::Config(format!(
                "unrecognized model provider '{}'",
                other
            ))),
        }
    }
}

/// Credentials and endpoint for a live model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCredentials {
    pub api_key: String,

    /// Base URL of the backend; defaults are provider-specific
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model identifier sent to the backend (e.g., "gpt-4o-mini")
    pub model: String,
}

/// How prohibited terms are matched against content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMatchMode {
    /// Case-insensitive match on word boundaries
    #[default]
    WordBoundary,
    /// Case-insensitive substring match
    Substring,
}

/// How rule-based and model-based confidence are combined
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ConfidenceFusion {
    /// Weighted average of model confidence and the rule score
    Weighted { model_weight: f64 },
    /// The lower of the two signals wins
    TakeMinimum,
}

impl Default for ConfidenceFusion {
    fn default() -> Self {
        ConfidenceFusion::Weighted { model_weight: 0.6 }
    }
}

/// Configurable policy for deterministic scoring and confidence fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringPolicy {
    #[serde(default)]
    pub term_match_mode: TermMatchMode,

    /// Confidence penalty per rule-based violation when computing the
    /// rule score `max(0, 1 - penalty * violations)`
    #[serde(default = "default_penalty")]
    pub violation_penalty: f64,

    #[serde(default)]
    pub fusion: ConfidenceFusion,
}

fn default_penalty() -> f64 {
    0.2
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            term_match_mode: TermMatchMode::default(),
            violation_penalty: default_penalty(),
            fusion: ConfidenceFusion::default(),
        }
    }
}

/// Complete configuration for one pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfiguration {
    pub default_jurisdiction: Jurisdiction,

    /// Minimum fused confidence below which content cannot be COMPLIANT
    pub compliance_threshold: f64,

    #[serde(default)]
    pub audit_detail_level: AuditDetailLevel,

    #[serde(default)]
    pub model_provider: ModelProviderKind,

    /// Use the in-memory knowledge sources instead of file-backed ones
    #[serde(default)]
    pub use_mock_knowledge: bool,

    /// Use the deterministic mock model instead of a live backend
    #[serde(default)]
    pub use_mock_model: bool,

    #[serde(default = "default_retries")]
    pub max_model_retries: u32,

    /// Base for exponential retry backoff (`base * 2^attempt`)
    #[serde(default = "default_backoff")]
    pub retry_backoff_base: Duration,

    /// Per-invocation model timeout
    #[serde(default = "default_model_timeout")]
    pub model_timeout: Duration,

    /// Return a deterministic placeholder after retry exhaustion instead
    /// of failing the request
    #[serde(default)]
    pub model_fallback_enabled: bool,

    /// TTL for cached knowledge bundles
    #[serde(default = "default_ttl")]
    pub knowledge_ttl: Duration,

    /// Short timeout for each knowledge source before falling back
    #[serde(default = "default_fetch_timeout")]
    pub knowledge_fetch_timeout: Duration,

    /// Directory holding live knowledge data files
    #[serde(default)]
    pub knowledge_data_dir: Option<String>,

    /// Required when `use_mock_model` is false
    #[serde(default)]
    pub credentials: Option<ModelCredentials>,

    #[serde(default)]
    pub scoring: ScoringPolicy,

    /// Path for the file-backed audit sink; in-memory when unset
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_model_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for PipelineConfiguration {
    fn default() -> Self {
        Self {
            default_jurisdiction: Jurisdiction::Ontario,
            compliance_threshold: 0.8,
            audit_detail_level: AuditDetailLevel::Standard,
            model_provider: ModelProviderKind::Mock,
            use_mock_knowledge: true,
            use_mock_model: true,
            max_model_retries: default_retries(),
            retry_backoff_base: default_backoff(),
            model_timeout: default_model_timeout(),
            model_fallback_enabled: false,
            knowledge_ttl: default_ttl(),
            knowledge_fetch_timeout: default_fetch_timeout(),
            knowledge_data_dir: None,
            credentials: None,
            scoring: ScoringPolicy::default(),
            audit_log_path: None,
        }
    }
}

impl PipelineConfiguration {
    /// Validate value ranges
    ///
    /// Combination checks (mock flags vs credentials) live in the factory,
    /// which is the only module that knows concrete implementations.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.compliance_threshold) {
            return Err(ComplianceError::validation(
                "compliance_threshold",
                format!(
                    "must be within [0.0, 1.0], got {}",
                    self.compliance_threshold
                ),
            ));
        }
        if self.retry_backoff_base.is_zero() {
            return Err(ComplianceError::validation(
                "retry_backoff_base",
                "must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.scoring.violation_penalty) {
            return Err(ComplianceError::validation(
                "scoring.violation_penalty",
                "must be within [0.0, 1.0]",
            ));
        }
        if let ConfidenceFusion::Weighted { model_weight } = self.scoring.fusion {
            if !(0.0..=1.0).contains(&model_weight) {
                return Err(ComplianceError::validation(
                    "scoring.fusion.model_weight",
                    "must be within [0.0, 1.0]",
                ));
            }
        }
        Ok(())
    }

    /// Read the configuration surface from the environment, once
    ///
    /// Recognized variables: `DEFAULT_JURISDICTION`, `COMPLIANCE_THRESHOLD`,
    /// `AUDIT_DETAIL_LEVEL`, `USE_MOCK_KNOWLEDGE`, `USE_MOCK_MODEL`,
    /// `MODEL_PROVIDER`, `MODEL_API_KEY`, `MODEL_NAME`, `MODEL_BASE_URL`,
    /// `MAX_MODEL_RETRIES`, `RETRY_BACKOFF_BASE_SECONDS`,
    /// `KNOWLEDGE_DATA_DIR`, `AUDIT_LOG_PATH`. Unset variables keep their
    /// defaults; malformed values are validation errors.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DEFAULT_JURISDICTION") {
            config.default_jurisdiction = v.parse()?;
        }
        if let Ok(v) = std::env::var("COMPLIANCE_THRESHOLD") {
            config.compliance_threshold = v.parse::<f64>().map_err(|e| {
                ComplianceError::validation("COMPLIANCE_THRESHOLD", e.to_string())
            })?;
        }
        if let Ok(v) = std::env::var("AUDIT_DETAIL_LEVEL") {
            config.audit_detail_level = v.parse()?;
        }
        if let Ok(v) = std::env::var("USE_MOCK_KNOWLEDGE") {
            config.use_mock_knowledge = parse_bool("USE_MOCK_KNOWLEDGE", &v)?;
        }
        if let Ok(v) = std::env::var("USE_MOCK_MODEL") {
            config.use_mock_model = parse_bool("USE_MOCK_MODEL", &v)?;
        }
        if let Ok(v) = std::env::var("MODEL_PROVIDER") {
            config.model_provider = v.parse()?;
        }
        if let Ok(v) = std::env::var("MAX_MODEL_RETRIES") {
            config.max_model_retries = v.parse::<u32>().map_err(|e| {
                ComplianceError::validation("MAX_MODEL_RETRIES", e.to_string())
            })?;
        }
        if let Ok(v) = std::env::var("RETRY_BACKOFF_BASE_SECONDS") {
            let secs = v.parse::<f64>().map_err(|e| {
                ComplianceError::validation("RETRY_BACKOFF_BASE_SECONDS", e.to_string())
            })?;
            if secs <= 0.0 {
                return Err(ComplianceError::validation(
                    "RETRY_BACKOFF_BASE_SECONDS",
                    "must be greater than zero",
                ));
            }
            config.retry_backoff_base = Duration::from_secs_f64(secs);
        }
        if let Ok(v) = std::env::var("KNOWLEDGE_DATA_DIR") {
            config.knowledge_data_dir = Some(v);
        }
        if let Ok(v) = std::env::var("AUDIT_LOG_PATH") {
            config.audit_log_path = Some(v);
        }

        if let Ok(api_key) = std::env::var("MODEL_API_KEY") {
            let model = std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            config.credentials = Some(ModelCredentials {
                api_key,
                base_url: std::env::var("MODEL_BASE_URL").ok(),
                model,
            });
        }

        config.validate()?;
        tracing::debug!(
            jurisdiction = %config.default_jurisdiction,
            provider = ?config.model_provider,
            mock_knowledge = config.use_mock_knowledge,
            mock_model = config.use_mock_model,
            "Configuration loaded from environment"
        );
        Ok(config)
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ComplianceError::validation(
            field,
            format!("expected boolean, got '{}'", other),
        )),
    }
}
