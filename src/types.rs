//! Core request/result/knowledge contracts for the compliance pipeline
//!
//! All wire types use camelCase JSON serialization; status enums use the
//! stable SCREAMING_SNAKE_CASE names consumers match on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{ComplianceError, Result};

/// Maximum accepted request content length, in bytes
pub const MAX_CONTENT_LEN: usize = 20_000;

/// Kind of marketing content under review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    MarketingCopy,
    Advertisement,
    SocialPost,
    Other,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentType::MarketingCopy => "marketing_copy",
            ContentType::Advertisement => "advertisement",
            ContentType::SocialPost => "social_post",
            ContentType::Other => "other",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ContentType {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "marketing_copy" => Ok(ContentType::MarketingCopy),
            "advertisement" => Ok(ContentType::Advertisement),
            "social_post" => Ok(ContentType::SocialPost),
            "other" => Ok(ContentType::Other),
            other => Err(ComplianceError::validation(
                "content_type",
                format!("unrecognized content type '{}'", other),
            )),
        }
    }
}

/// Supported regulatory jurisdictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    #[serde(rename = "ON")]
    Ontario,
    #[serde(rename = "BC")]
    BritishColumbia,
    #[serde(rename = "AB")]
    Alberta,
    #[serde(rename = "FED")]
    Federal,
}

impl Jurisdiction {
    /// Two/three-letter code used in wire formats and data file names
    pub fn code(&self) -> &'static str {
        match self {
            Jurisdiction::Ontario => "ON",
            Jurisdiction::BritishColumbia => "BC",
            Jurisdiction::Alberta => "AB",
            Jurisdiction::Federal => "FED",
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Jurisdiction {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ON" => Ok(Jurisdiction::Ontario),
            "BC" => Ok(Jurisdiction::BritishColumbia),
            "AB" => Ok(Jurisdiction::Alberta),
            "FED" => Ok(Jurisdiction::Federal),
            other => Err(ComplianceError::validation(
                "jurisdiction",
                format!("unrecognized jurisdiction '{}'", other),
            )),
        }
    }
}

/// A validated compliance-check request
///
/// Immutable once constructed; fields are only reachable through accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRequest {
    content: String,
    content_type: ContentType,
    jurisdiction: Jurisdiction,
    requested_at: DateTime<Utc>,
}

impl ComplianceRequest {
    /// Validate and construct a request
    ///
    /// Fails with `Validation` when content is empty, whitespace-only, or
    /// exceeds `MAX_CONTENT_LEN` bytes.
    pub fn new(
        content: impl Into<String>,
        content_type: ContentType,
        jurisdiction: Jurisdiction,
    ) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ComplianceError::validation(
                "content",
                "content must not be empty",
            ));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(ComplianceError::validation(
                "content",
                format!(
                    "content length {} exceeds maximum of {} bytes",
                    content.len(),
                    MAX_CONTENT_LEN
                ),
            ));
        }

        Ok(Self {
            content,
            content_type,
            jurisdiction,
            requested_at: Utc::now(),
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        self.jurisdiction
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Stable-per-run correlation hash over the request fields
    ///
    /// Used to tie audit events to a request without storing its content.
    pub fn correlation_hash(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.content.hash(&mut hasher);
        self.content_type.hash(&mut hasher);
        self.jurisdiction.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Severity of a compliance violation
///
/// Ordering matters: `Finalizing` treats anything `>= Medium` as grounds
/// for a NON_COMPLIANT status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single compliance violation, rule-based or model-reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Identifier of the rule that was violated
    pub rule_id: String,

    /// Human-readable description of the violation
    pub description: String,

    /// Severity level
    pub severity: Severity,

    /// Byte offsets of the matched span in the request content, if known
    #[serde(default)]
    pub matched_span: Option<(usize, usize)>,
}

/// Where a disclaimer is positioned in rendered content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclaimerPosition {
    Header,
    #[default]
    Footer,
    Inline,
}

/// Mandatory or advisory boilerplate text for a jurisdiction/content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclaimer {
    pub id: String,
    pub text: String,

    /// Jurisdiction this disclaimer is scoped to; `None` applies everywhere
    #[serde(default)]
    pub jurisdiction: Option<Jurisdiction>,

    /// Content types this disclaimer applies to; empty means all
    #[serde(default)]
    pub applies_to: Vec<ContentType>,

    /// Whether attachment is mandatory even on compliant results
    #[serde(default = "default_true")]
    pub mandatory: bool,

    #[serde(default)]
    pub position: DisclaimerPosition,
}

impl Disclaimer {
    /// Whether this disclaimer applies to the given context
    pub fn applies(&self, jurisdiction: Jurisdiction, content_type: ContentType) -> bool {
        let jurisdiction_ok = self.jurisdiction.map_or(true, |j| j == jurisdiction);
        let content_ok = self.applies_to.is_empty() || self.applies_to.contains(&content_type);
        jurisdiction_ok && content_ok
    }
}

fn default_true() -> bool {
    true
}

/// An advertising rule enforced by a regulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisingRule {
    pub rule_id: String,

    /// The text of the rule as published by the enforcement body
    pub text: String,

    /// Category of the rule (e.g., "guarantees", "solicitation", "testimonials")
    pub category: String,

    /// Terms whose presence in content constitutes a potential violation
    #[serde(default)]
    pub prohibited_terms: Vec<String>,

    pub severity: Severity,

    /// Jurisdiction this rule is scoped to; `None` applies everywhere
    #[serde(default)]
    pub jurisdiction: Option<Jurisdiction>,

    /// Content types this rule applies to; empty means all
    #[serde(default)]
    pub applies_to: Vec<ContentType>,

    /// Body that enforces this rule (e.g., "Law Society of Ontario")
    #[serde(default)]
    pub enforcement_body: String,
}

impl AdvertisingRule {
    /// Whether this rule applies to the given context
    pub fn applies(&self, jurisdiction: Jurisdiction, content_type: ContentType) -> bool {
        let jurisdiction_ok = self.jurisdiction.map_or(true, |j| j == jurisdiction);
        let content_ok = self.applies_to.is_empty() || self.applies_to.contains(&content_type);
        jurisdiction_ok && content_ok
    }
}

/// Required compliance level for an ethical guideline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    #[default]
    Recommended,
    Required,
    Mandatory,
}

/// A professional-conduct guideline included in the model's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthicalGuideline {
    pub guideline_id: String,
    pub title: String,
    pub description: String,

    #[serde(default)]
    pub compliance_level: ComplianceLevel,

    /// Reference to the source document or rule
    #[serde(default)]
    pub reference: String,

    /// Jurisdiction this guideline is scoped to; `None` applies everywhere
    #[serde(default)]
    pub jurisdiction: Option<Jurisdiction>,

    /// Content types this guideline applies to; empty means all
    #[serde(default)]
    pub applies_to: Vec<ContentType>,
}

/// Provenance of a knowledge bundle or one of its sections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleSource {
    #[default]
    Live,
    FallbackDefault,
}

/// Per-section provenance for a merged bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSources {
    pub disclaimers: BundleSource,
    pub advertising_rules: BundleSource,
    pub ethical_guidelines: BundleSource,
}

impl SectionSources {
    /// Whether any section fell back to built-in defaults
    pub fn any_degraded(&self) -> bool {
        self.disclaimers == BundleSource::FallbackDefault
            || self.advertising_rules == BundleSource::FallbackDefault
            || self.ethical_guidelines == BundleSource::FallbackDefault
    }
}

/// Merged domain knowledge for one jurisdiction/content-type pair
///
/// Owned by the knowledge layer and lent to the pipeline for the duration
/// of one request; cached under a TTL keyed by (jurisdiction, content type).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBundle {
    pub disclaimers: Vec<Disclaimer>,
    pub advertising_rules: Vec<AdvertisingRule>,
    pub ethical_guidelines: Vec<EthicalGuideline>,
    pub jurisdiction: Jurisdiction,
    pub fetched_at: DateTime<Utc>,
    pub source: BundleSource,
    pub sections: SectionSources,
}

impl KnowledgeBundle {
    /// An empty live bundle for the given jurisdiction
    pub fn empty(jurisdiction: Jurisdiction) -> Self {
        Self {
            disclaimers: Vec::new(),
            advertising_rules: Vec::new(),
            ethical_guidelines: Vec::new(),
            jurisdiction,
            fetched_at: Utc::now(),
            source: BundleSource::Live,
            sections: SectionSources::default(),
        }
    }
}

/// Final status of a compliance check — a judgment, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    RequiresReview,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
            ComplianceStatus::RequiresReview => "REQUIRES_REVIEW",
        };
        f.write_str(s)
    }
}

/// Structured outcome of one pipeline run
///
/// Every field is always serialized, even when empty — consumers rely on
/// stable field presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceResult {
    pub status: ComplianceStatus,

    /// Fused rule/model confidence in [0, 1]
    pub confidence_score: f64,

    pub violations: Vec<Violation>,
    pub recommendations: Vec<String>,
    pub disclaimers_applied: Vec<Disclaimer>,

    /// True when any knowledge section fell back to built-in defaults
    pub degraded_context: bool,

    /// Identifier of the audit trail for this run
    pub audit_id: String,
}

/// Pipeline stage markers recorded in audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validating,
    ContextFetching,
    Invoking,
    Retrying,
    OutputValidating,
    RuleScoring,
    DisclaimerInjection,
    ConfidentialityRedaction,
    Finalizing,
    Completed,
    Rejected,
    Failed,
    Cancelled,
}

impl PipelineStage {
    /// Terminal stages emit exactly one audit event per request outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Completed
                | PipelineStage::Rejected
                | PipelineStage::Failed
                | PipelineStage::Cancelled
        )
    }
}

/// How much detail audit events carry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDetailLevel {
    /// Only terminal transitions and final status
    Minimal,
    /// All stage transitions
    #[default]
    Standard,
    /// Stage transitions plus full prompt/response pairs
    Verbose,
}

impl std::str::FromStr for AuditDetailLevel {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(AuditDetailLevel::Minimal),
            "standard" => Ok(AuditDetailLevel::Standard),
            "verbose" => Ok(AuditDetailLevel::Verbose),
            other => Err(ComplianceError::validation(
                "audit_detail_level",
                format!("unrecognized detail level '{}'", other),
            )),
        }
    }
}

/// Immutable record of one pipeline-stage decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Audit trail id shared by all events of one run
    pub audit_id: String,

    /// Correlation hash of the request (never its content)
    pub request_hash: String,

    pub stage: PipelineStage,

    /// Short decision summary (e.g., "proceed", "degraded", "retry 2/3")
    pub decision: String,

    pub timestamp: DateTime<Utc>,

    /// Structured detail; shape depends on stage and detail level
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl AuditEvent {
    /// Create an event stamped with the current time
    pub fn new(
        audit_id: impl Into<String>,
        request_hash: impl Into<String>,
        stage: PipelineStage,
        decision: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            audit_id: audit_id.into(),
            request_hash: request_hash.into(),
            stage,
            decision: decision.into(),
            timestamp: Utc::now(),
            detail,
        }
    }
}

/// Generate a fresh audit trail id
pub fn new_audit_id() -> String {
    format!("aud-{}", uuid::Uuid::new_v4())
}
