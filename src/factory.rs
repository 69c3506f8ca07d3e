//! Pipeline assembly
//!
//! The factory is the only module that knows concrete implementations: it
//! turns a validated [`PipelineConfiguration`] into a wired
//! [`CompliancePipeline`]. Everything downstream sees trait objects.

use std::sync::Arc;

use crate::audit::{AuditLog, AuditSink, FileAuditSink, MemoryAuditSink};
use crate::config::{ModelProviderKind, PipelineConfiguration};
use crate::error::{ComplianceError, Result};
use crate::knowledge::{
    AdvertisingRuleSource, DisclaimerSource, FileKnowledgeSource, GuidelineSource,
    KnowledgeAggregator, MemoryKnowledgeStore,
};
use crate::model::{HttpModelClient, MockModelClient, ModelClient, ModelRunner};
use crate::pipeline::CompliancePipeline;

/// Builds fully wired pipelines from configuration
pub struct PipelineFactory;

impl PipelineFactory {
    /// Build a pipeline from the environment configuration
    pub fn from_env() -> Result<CompliancePipeline> {
        Self::build(PipelineConfiguration::from_env()?)
    }

    /// Build a pipeline from an explicit configuration
    ///
    /// Performs the combination checks value-range validation cannot: a
    /// live model backend needs credentials, live knowledge needs a data
    /// directory.
    pub fn build(config: PipelineConfiguration) -> Result<CompliancePipeline> {
        config.validate()?;

        let knowledge = Arc::new(build_knowledge(&config)?);
        let client = build_model_client(&config)?;
        let runner = ModelRunner::new(
            client,
            config.max_model_retries,
            config.retry_backoff_base,
            config.model_timeout,
            config.model_fallback_enabled,
        );

        let sink: Arc<dyn AuditSink> = match &config.audit_log_path {
            Some(path) => Arc::new(FileAuditSink::new(path)),
            None => Arc::new(MemoryAuditSink::new()),
        };
        let audit = AuditLog::new(sink, config.audit_detail_level);

        tracing::info!(
            provider = ?config.model_provider,
            mock_model = config.use_mock_model,
            mock_knowledge = config.use_mock_knowledge,
            jurisdiction = %config.default_jurisdiction,
            "Compliance pipeline assembled"
        );
        Ok(CompliancePipeline::new(knowledge, runner, audit, &config))
    }
}

fn build_knowledge(config: &PipelineConfiguration) -> Result<KnowledgeAggregator> {
    let (disclaimers, rules, guidelines): (
        Arc<dyn DisclaimerSource>,
        Arc<dyn AdvertisingRuleSource>,
        Arc<dyn GuidelineSource>,
    ) = if config.use_mock_knowledge {
        let store = Arc::new(MemoryKnowledgeStore::with_fixtures());
        (store.clone(), store.clone(), store)
    } else {
        let dir = config.knowledge_data_dir.as_ref().ok_or_else(|| {
            ComplianceError::Config(
                "knowledge_data_dir is required when use_mock_knowledge is false".into(),
            )
        })?;
        let source = Arc::new(FileKnowledgeSource::new(dir));
        (source.clone(), source.clone(), source)
    };

    Ok(KnowledgeAggregator::new(
        disclaimers,
        rules,
        guidelines,
        config.knowledge_ttl,
        config.knowledge_fetch_timeout,
    ))
}

fn build_model_client(config: &PipelineConfiguration) -> Result<Arc<dyn ModelClient>> {
    if config.use_mock_model {
        return Ok(Arc::new(MockModelClient::compliant()));
    }

    match config.model_provider {
        ModelProviderKind::Mock => Ok(Arc::new(MockModelClient::compliant())),
        ModelProviderKind::OpenAi => {
            let credentials = require_credentials(config)?;
            Ok(Arc::new(HttpModelClient::openai(
                credentials,
                config.model_timeout,
            )?))
        }
        ModelProviderKind::Anthropic => {
            let credentials = require_credentials(config)?;
            Ok(Arc::new(HttpModelClient::anthropic(
                credentials,
                config.model_timeout,
            )?))
        }
    }
}

fn require_credentials(
    config: &PipelineConfiguration,
) -> Result<&crate::config::ModelCredentials> {
    config.credentials.as_ref().ok_or_else(|| {
        ComplianceError::Config(format!(
            "model provider {:?} requires credentials",
            config.model_provider
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelCredentials;
    use crate::types::{ContentType, Jurisdiction};

    #[tokio::test]
    async fn test_default_config_builds_and_runs() {
        let pipeline = PipelineFactory::build(PipelineConfiguration::default()).unwrap();
        let result = pipeline
            .check(
                "Experienced employment lawyers serving Toronto.",
                ContentType::MarketingCopy,
                Jurisdiction::Ontario,
            )
            .await
            .unwrap();
        assert!(!result.audit_id.is_empty());
    }

    #[test]
    fn test_live_model_without_credentials_is_rejected() {
        let config = PipelineConfiguration {
            use_mock_model: false,
            model_provider: ModelProviderKind::OpenAi,
            ..PipelineConfiguration::default()
        };
        let err = PipelineFactory::build(config).err().unwrap();
        assert!(matches!(err, ComplianceError::Config(_)));
    }

    #[test]
    fn test_live_knowledge_without_data_dir_is_rejected() {
        let config = PipelineConfiguration {
            use_mock_knowledge: false,
            ..PipelineConfiguration::default()
        };
        let err = PipelineFactory::build(config).err().unwrap();
        assert!(matches!(err, ComplianceError::Config(_)));
    }

    #[test]
    fn test_live_backends_build_with_full_config() {
        let config = PipelineConfiguration {
            use_mock_model: false,
            use_mock_knowledge: false,
            model_provider: ModelProviderKind::Anthropic,
            knowledge_data_dir: Some("/tmp/lexguard-data".into()),
            credentials: Some(ModelCredentials {
                api_key: "key".into(),
                base_url: None,
                model: "claude-3-5-haiku-latest".into(),
            }),
            ..PipelineConfiguration::default()
        };
        PipelineFactory::build(config).unwrap();
    }

    #[test]
    fn test_invalid_config_rejected_before_wiring() {
        let config = PipelineConfiguration {
            compliance_threshold: 2.0,
            ..PipelineConfiguration::default()
        };
        assert!(PipelineFactory::build(config).is_err());
    }
}
