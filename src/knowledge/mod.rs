//! Knowledge provider layer — disclaimers, advertising rules, guidelines
//!
//! Three narrow source traits feed a pipeline-level aggregator that caches
//! per `(jurisdiction, content_type)` key with single-flight refresh and
//! degrades to built-in defaults when a source fails or times out. The
//! aggregator never returns an error upward: compliance context
//! unavailability degrades, it does not abort.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::SingleFlightCache;
use crate::error::{ComplianceError, Result};
use crate::types::{
    AdvertisingRule, BundleSource, ComplianceLevel, ContentType, Disclaimer, DisclaimerPosition,
    EthicalGuideline, Jurisdiction, KnowledgeBundle, SectionSources, Severity,
};

pub mod file;
pub mod memory;

pub use file::FileKnowledgeSource;
pub use memory::{MemoryKnowledgeStore, UnavailableSource};

/// Source of disclaimers for a jurisdiction/content-type pair
#[async_trait]
pub trait DisclaimerSource: Send + Sync {
    async fn fetch_disclaimers(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<Disclaimer>>;

    /// Source name used in logs and audit detail
    fn name(&self) -> &str;
}

/// Source of advertising rules for a jurisdiction/content-type pair
#[async_trait]
pub trait AdvertisingRuleSource: Send + Sync {
    async fn fetch_rules(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<AdvertisingRule>>;

    fn name(&self) -> &str;
}

/// Source of ethical guidelines for a jurisdiction/content-type pair
#[async_trait]
pub trait GuidelineSource: Send + Sync {
    async fn fetch_guidelines(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<EthicalGuideline>>;

    fn name(&self) -> &str;
}

type CacheKey = (Jurisdiction, ContentType);

/// Merges the three knowledge sources into one cached, degradable bundle
///
/// The caches are the only shared mutable state across concurrent pipeline
/// invocations; each section refreshes under its own single-flight slot.
pub struct KnowledgeAggregator {
    disclaimers: Arc<dyn DisclaimerSource>,
    rules: Arc<dyn AdvertisingRuleSource>,
    guidelines: Arc<dyn GuidelineSource>,
    disclaimer_cache: SingleFlightCache<CacheKey, Vec<Disclaimer>>,
    rule_cache: SingleFlightCache<CacheKey, Vec<AdvertisingRule>>,
    guideline_cache: SingleFlightCache<CacheKey, Vec<EthicalGuideline>>,
    fetch_timeout: Duration,
}

impl KnowledgeAggregator {
    pub fn new(
        disclaimers: Arc<dyn DisclaimerSource>,
        rules: Arc<dyn AdvertisingRuleSource>,
        guidelines: Arc<dyn GuidelineSource>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            disclaimers,
            rules,
            guidelines,
            disclaimer_cache: SingleFlightCache::new(ttl),
            rule_cache: SingleFlightCache::new(ttl),
            guideline_cache: SingleFlightCache::new(ttl),
            fetch_timeout,
        }
    }

    /// Fetch the merged bundle for one request context
    ///
    /// Always succeeds. A section whose source fails or exceeds the fetch
    /// timeout is replaced by the built-in default for that jurisdiction
    /// and marked `fallback-default`; failed loads are not cached, so the
    /// next request retries the live source.
    pub async fn fetch(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> KnowledgeBundle {
        let key = (jurisdiction, content_type);
        let timeout = self.fetch_timeout;

        let disclaimers = self.disclaimer_cache.get_or_load(key, || {
            let source = Arc::clone(&self.disclaimers);
            async move {
                with_timeout(timeout, source.name(), source.fetch_disclaimers(jurisdiction, content_type)).await
            }
        });
        let rules = self.rule_cache.get_or_load(key, || {
            let source = Arc::clone(&self.rules);
            async move {
                with_timeout(timeout, source.name(), source.fetch_rules(jurisdiction, content_type)).await
            }
        });
        let guidelines = self.guideline_cache.get_or_load(key, || {
            let source = Arc::clone(&self.guidelines);
            async move {
                with_timeout(timeout, source.name(), source.fetch_guidelines(jurisdiction, content_type)).await
            }
        });

        let (disclaimers, rules, guidelines) = futures::join!(disclaimers, rules, guidelines);

        let mut sections = SectionSources::default();

        let disclaimers = disclaimers.unwrap_or_else(|e| {
            tracing::warn!(jurisdiction = %jurisdiction, error = %e, "Disclaimer source degraded to defaults");
            sections.disclaimers = BundleSource::FallbackDefault;
            default_disclaimers(jurisdiction)
        });
        let advertising_rules = rules.unwrap_or_else(|e| {
            tracing::warn!(jurisdiction = %jurisdiction, error = %e, "Advertising rule source degraded to defaults");
            sections.advertising_rules = BundleSource::FallbackDefault;
            default_rules(jurisdiction)
        });
        let ethical_guidelines = guidelines.unwrap_or_else(|e| {
            tracing::warn!(jurisdiction = %jurisdiction, error = %e, "Guideline source degraded to defaults");
            sections.ethical_guidelines = BundleSource::FallbackDefault;
            default_guidelines()
        });

        let source = if sections.any_degraded() {
            BundleSource::FallbackDefault
        } else {
            BundleSource::Live
        };

        KnowledgeBundle {
            disclaimers,
            advertising_rules,
            ethical_guidelines,
            jurisdiction,
            fetched_at: Utc::now(),
            source,
            sections,
        }
    }

    /// Drop cached sections for one key (all three caches)
    pub async fn invalidate(&self, jurisdiction: Jurisdiction, content_type: ContentType) {
        let key = (jurisdiction, content_type);
        self.disclaimer_cache.invalidate(&key).await;
        self.rule_cache.invalidate(&key).await;
        self.guideline_cache.invalidate(&key).await;
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    source: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ComplianceError::Knowledge {
            provider: source.to_string(),
            reason: format!("fetch exceeded {}ms", timeout.as_millis()),
        }),
    }
}

/// Built-in default disclaimers used when a live source is unavailable
pub fn default_disclaimers(jurisdiction: Jurisdiction) -> Vec<Disclaimer> {
    vec![
        Disclaimer {
            id: "default-not-legal-advice".into(),
            text: "This content is for informational purposes only and does not \
                   constitute legal advice."
                .into(),
            jurisdiction: None,
            applies_to: vec![],
            mandatory: true,
            position: DisclaimerPosition::Footer,
        },
        Disclaimer {
            id: format!("default-{}-past-results", jurisdiction.code().to_lowercase()),
            text: "Past results are not necessarily indicative of future outcomes. \
                   Each legal matter is unique."
                .into(),
            jurisdiction: Some(jurisdiction),
            applies_to: vec![ContentType::MarketingCopy, ContentType::Advertisement],
            mandatory: true,
            position: DisclaimerPosition::Footer,
        },
    ]
}

/// Built-in default advertising rules used when a live source is unavailable
pub fn default_rules(jurisdiction: Jurisdiction) -> Vec<AdvertisingRule> {
    vec![
        AdvertisingRule {
            rule_id: "default-no-guarantees".into(),
            text: "Lawyers must not guarantee outcomes in legal matters.".into(),
            category: "guarantees".into(),
            prohibited_terms: vec![
                "guarantee".into(),
                "guaranteed".into(),
                "we always win".into(),
            ],
            severity: Severity::High,
            jurisdiction: None,
            applies_to: vec![],
            enforcement_body: format!("Law Society ({})", jurisdiction.code()),
        },
        AdvertisingRule {
            rule_id: "default-no-pressure-solicitation".into(),
            text: "Marketing must not pressure prospective clients into retaining \
                   counsel."
                .into(),
            category: "solicitation".into(),
            prohibited_terms: vec![
                "act fast".into(),
                "call now".into(),
                "limited time".into(),
            ],
            severity: Severity::Medium,
            jurisdiction: None,
            applies_to: vec![],
            enforcement_body: format!("Law Society ({})", jurisdiction.code()),
        },
    ]
}

/// Built-in default ethical guidelines used when a live source is unavailable
pub fn default_guidelines() -> Vec<EthicalGuideline> {
    vec![EthicalGuideline {
        guideline_id: "default-accuracy".into(),
        title: "Accuracy of public communications".into(),
        description: "All statements about legal services must be accurate, \
                      verifiable, and not misleading."
            .into(),
        compliance_level: ComplianceLevel::Mandatory,
        reference: "Model Code of Professional Conduct".into(),
        jurisdiction: None,
        applies_to: vec![],
    }]
}
