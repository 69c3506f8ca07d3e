//! # lexguard
//!
//! Compliance-aware model execution pipeline for legal marketing content.
//!
//! ## Overview
//!
//! `lexguard` wraps a generative-model call in a compliance pipeline:
//! jurisdiction-specific knowledge is injected into the prompt, the model's
//! output is re-validated and scored against deterministic advertising
//! rules, mandatory disclaimers are attached, confidential identifiers are
//! redacted, and every stage decision lands in an audit trail. Swap model
//! backends (mock, OpenAI-style, Anthropic-style) without changing
//! application code.
//!
//! ## Quick Start
//!
//! ```rust
//! use lexguard::{ContentType, Jurisdiction, PipelineConfiguration, PipelineFactory};
//!
//! # async fn example() -> lexguard::Result<()> {
//! // Mock knowledge and mock model; no network, no files
//! let pipeline = PipelineFactory::build(PipelineConfiguration::default())?;
//!
//! let result = pipeline
//!     .check(
//!         "Experienced family lawyers serving Toronto.",
//!         ContentType::MarketingCopy,
//!         Jurisdiction::Ontario,
//!     )
//!     .await?;
//!
//! println!("{} (confidence {:.2})", result.status, result.confidence_score);
//! for disclaimer in &result.disclaimers_applied {
//!     println!("  + {}", disclaimer.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **ModelClient** trait — core abstraction all model backends implement
//! - **CompliancePipeline** — staged check with retries, degradation, audit
//! - **KnowledgeAggregator** — cached, degradable disclaimers/rules/guidelines
//! - **PipelineFactory** — turns one configuration into a wired pipeline
//!
//! ## Failure semantics
//!
//! Knowledge sources degrade to built-in defaults, transient model errors
//! retry with exponential backoff, audit sink failures divert to a fallback
//! buffer. The only errors a caller sees are request validation and
//! analysis unavailability.

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod knowledge;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod types;

// Re-export core types
pub use config::{
    ConfidenceFusion, ModelCredentials, ModelProviderKind, PipelineConfiguration, ScoringPolicy,
    TermMatchMode,
};
pub use error::{ComplianceError, ModelError, Result};
pub use factory::PipelineFactory;
pub use pipeline::CompliancePipeline;
pub use types::{
    AdvertisingRule, AuditDetailLevel, AuditEvent, ComplianceRequest, ComplianceResult,
    ComplianceStatus, ContentType, Disclaimer, EthicalGuideline, Jurisdiction, KnowledgeBundle,
    PipelineStage, Severity, Violation,
};

// Re-export the seams most integrations touch
pub use audit::{AuditLog, AuditSink, FileAuditSink, MemoryAuditSink};
pub use knowledge::{FileKnowledgeSource, KnowledgeAggregator, MemoryKnowledgeStore};
pub use model::{
    HttpModelClient, InvocationFailure, MockModelClient, ModelClient, ModelOutput, ModelPrompt,
    ModelRunner,
};
