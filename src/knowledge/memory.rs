//! In-memory knowledge sources for development and testing
//!
//! `MemoryKnowledgeStore` serves all three source traits from in-process
//! collections; `UnavailableSource` always fails, for exercising the
//! degradation path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{AdvertisingRuleSource, DisclaimerSource, GuidelineSource};
use crate::error::{ComplianceError, Result};
use crate::types::{
    AdvertisingRule, ComplianceLevel, ContentType, Disclaimer, DisclaimerPosition,
    EthicalGuideline, Jurisdiction, Severity,
};

/// In-memory implementation of all three knowledge source traits
pub struct MemoryKnowledgeStore {
    disclaimers: RwLock<Vec<Disclaimer>>,
    rules: RwLock<Vec<AdvertisingRule>>,
    guidelines: RwLock<Vec<EthicalGuideline>>,
    unavailable: AtomicBool,
    disclaimer_fetches: AtomicUsize,
}

impl MemoryKnowledgeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            disclaimers: RwLock::new(Vec::new()),
            rules: RwLock::new(Vec::new()),
            guidelines: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            disclaimer_fetches: AtomicUsize::new(0),
        }
    }

    /// Create a store preloaded with ON/BC fixtures
    pub fn with_fixtures() -> Self {
        let store = Self::new();
        {
            let mut disclaimers = store.disclaimers.write().unwrap();
            disclaimers.push(Disclaimer {
                id: "on-attorney-advertising".into(),
                text: "Attorney Advertising. Prior results do not guarantee a similar \
                       outcome."
                    .into(),
                jurisdiction: Some(Jurisdiction::Ontario),
                applies_to: vec![ContentType::MarketingCopy, ContentType::Advertisement],
                mandatory: true,
                position: DisclaimerPosition::Footer,
            });
            disclaimers.push(Disclaimer {
                id: "bc-legal-services".into(),
                text: "This communication is from a law firm and may constitute \
                       attorney advertising."
                    .into(),
                jurisdiction: Some(Jurisdiction::BritishColumbia),
                applies_to: vec![ContentType::MarketingCopy],
                mandatory: true,
                position: DisclaimerPosition::Footer,
            });
            disclaimers.push(Disclaimer {
                id: "generic-no-advice".into(),
                text: "Nothing in this material constitutes legal advice.".into(),
                jurisdiction: None,
                applies_to: vec![],
                mandatory: true,
                position: DisclaimerPosition::Footer,
            });
        }
        {
            let mut rules = store.rules.write().unwrap();
            rules.push(AdvertisingRule {
                rule_id: "on-guarantee-prohibition".into(),
                text: "Lawyers must not guarantee outcomes in legal matters.".into(),
                category: "guarantees".into(),
                prohibited_terms: vec!["guarantee".into(), "guaranteed".into()],
                severity: Severity::High,
                jurisdiction: Some(Jurisdiction::Ontario),
                applies_to: vec![],
                enforcement_body: "Law Society of Ontario".into(),
            });
            rules.push(AdvertisingRule {
                rule_id: "bc-solicitation-rules".into(),
                text: "Lawyers must not engage in aggressive solicitation.".into(),
                category: "solicitation".into(),
                prohibited_terms: vec!["call now".into(), "act fast".into(), "limited time".into()],
                severity: Severity::Medium,
                jurisdiction: Some(Jurisdiction::BritishColumbia),
                applies_to: vec![],
                enforcement_body: "Law Society of British Columbia".into(),
            });
            rules.push(AdvertisingRule {
                rule_id: "testimonial-disclosure".into(),
                text: "Client testimonials require context disclosure.".into(),
                category: "testimonials".into(),
                prohibited_terms: vec![],
                severity: Severity::Low,
                jurisdiction: None,
                applies_to: vec![ContentType::SocialPost, ContentType::Advertisement],
                enforcement_body: "General".into(),
            });
        }
        {
            let mut guidelines = store.guidelines.write().unwrap();
            guidelines.push(EthicalGuideline {
                guideline_id: "content-accuracy".into(),
                title: "Ensure content accuracy".into(),
                description: "All legal content must be accurate and up-to-date.".into(),
                compliance_level: ComplianceLevel::Mandatory,
                reference: "Professional Conduct Rules 3.1".into(),
                jurisdiction: None,
                applies_to: vec![],
            });
            guidelines.push(EthicalGuideline {
                guideline_id: "confidentiality-protection".into(),
                title: "Protect client confidentiality".into(),
                description: "Client information must be protected at all times.".into(),
                compliance_level: ComplianceLevel::Mandatory,
                reference: "Professional Conduct Rules 1.6".into(),
                jurisdiction: None,
                applies_to: vec![],
            });
        }
        store
    }

    /// Add a disclaimer to the store
    pub fn add_disclaimer(&self, disclaimer: Disclaimer) {
        self.disclaimers.write().unwrap().push(disclaimer);
    }

    /// Add an advertising rule to the store
    pub fn add_rule(&self, rule: AdvertisingRule) {
        self.rules.write().unwrap().push(rule);
    }

    /// Add an ethical guideline to the store
    pub fn add_guideline(&self, guideline: EthicalGuideline) {
        self.guidelines.write().unwrap().push(guideline);
    }

    /// Toggle simulated unavailability (all fetches fail while set)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of disclaimer fetches that reached this store
    pub fn disclaimer_fetches(&self) -> usize {
        self.disclaimer_fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ComplianceError::Knowledge {
                provider: "memory".into(),
                reason: "store marked unavailable".into(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisclaimerSource for MemoryKnowledgeStore {
    async fn fetch_disclaimers(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<Disclaimer>> {
        self.check_available()?;
        self.disclaimer_fetches.fetch_add(1, Ordering::SeqCst);
        let disclaimers = self.disclaimers.read().unwrap();
        Ok(disclaimers
            .iter()
            .filter(|d| d.applies(jurisdiction, content_type))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl AdvertisingRuleSource for MemoryKnowledgeStore {
    async fn fetch_rules(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<AdvertisingRule>> {
        self.check_available()?;
        let rules = self.rules.read().unwrap();
        Ok(rules
            .iter()
            .filter(|r| r.applies(jurisdiction, content_type))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl GuidelineSource for MemoryKnowledgeStore {
    async fn fetch_guidelines(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<EthicalGuideline>> {
        self.check_available()?;
        let guidelines = self.guidelines.read().unwrap();
        Ok(guidelines
            .iter()
            .filter(|g| {
                g.jurisdiction.map_or(true, |j| j == jurisdiction)
                    && (g.applies_to.is_empty() || g.applies_to.contains(&content_type))
            })
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Knowledge source that always fails — for degradation tests
pub struct UnavailableSource {
    name: String,
}

impl UnavailableSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn err(&self) -> ComplianceError {
        ComplianceError::Knowledge {
            provider: self.name.clone(),
            reason: "source unreachable".into(),
        }
    }
}

#[async_trait]
impl DisclaimerSource for UnavailableSource {
    async fn fetch_disclaimers(
        &self,
        _jurisdiction: Jurisdiction,
        _content_type: ContentType,
    ) -> Result<Vec<Disclaimer>> {
        Err(self.err())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl AdvertisingRuleSource for UnavailableSource {
    async fn fetch_rules(
        &self,
        _jurisdiction: Jurisdiction,
        _content_type: ContentType,
    ) -> Result<Vec<AdvertisingRule>> {
        Err(self.err())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl GuidelineSource for UnavailableSource {
    async fn fetch_guidelines(
        &self,
        _jurisdiction: Jurisdiction,
        _content_type: ContentType,
    ) -> Result<Vec<EthicalGuideline>> {
        Err(self.err())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
