//! Pipeline integration tests
//!
//! End-to-end tests exercising the full compliance pipeline with in-memory
//! knowledge and a scripted mock model. Covers deterministic scoring,
//! degradation, retries, fallback, disclaimers, redaction, audit trails,
//! and concurrency.

use lexguard::audit::MemoryAuditSink;
use lexguard::knowledge::UnavailableSource;
use lexguard::model::{MockModelClient, ModelOutput, ModelRunner};
use lexguard::{
    AuditLog, ComplianceError, CompliancePipeline, ComplianceStatus, ContentType, Jurisdiction,
    KnowledgeAggregator, MemoryKnowledgeStore, ModelError, PipelineConfiguration, PipelineStage,
    Severity, Violation,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    pipeline: Arc<CompliancePipeline>,
    store: Arc<MemoryKnowledgeStore>,
    model: Arc<MockModelClient>,
    sink: Arc<MemoryAuditSink>,
}

fn fast_config() -> PipelineConfiguration {
    PipelineConfiguration {
        retry_backoff_base: Duration::from_millis(1),
        ..PipelineConfiguration::default()
    }
}

fn harness(model: MockModelClient, config: PipelineConfiguration) -> Harness {
    let store = Arc::new(MemoryKnowledgeStore::with_fixtures());
    let knowledge = Arc::new(KnowledgeAggregator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        config.knowledge_ttl,
        config.knowledge_fetch_timeout,
    ));
    let model = Arc::new(model);
    let runner = ModelRunner::new(
        model.clone(),
        config.max_model_retries,
        config.retry_backoff_base,
        config.model_timeout,
        config.model_fallback_enabled,
    );
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditLog::new(sink.clone(), config.audit_detail_level);
    let pipeline = Arc::new(CompliancePipeline::new(knowledge, runner, audit, &config));
    Harness {
        pipeline,
        store,
        model,
        sink,
    }
}

/// Harness whose knowledge sources are all unreachable
fn degraded_harness(model: MockModelClient, config: PipelineConfiguration) -> Harness {
    let dead = Arc::new(UnavailableSource::new("dead-store"));
    let knowledge = Arc::new(KnowledgeAggregator::new(
        dead.clone(),
        dead.clone(),
        dead,
        config.knowledge_ttl,
        config.knowledge_fetch_timeout,
    ));
    let model = Arc::new(model);
    let runner = ModelRunner::new(
        model.clone(),
        config.max_model_retries,
        config.retry_backoff_base,
        config.model_timeout,
        config.model_fallback_enabled,
    );
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditLog::new(sink.clone(), config.audit_detail_level);
    let pipeline = Arc::new(CompliancePipeline::new(knowledge, runner, audit, &config));
    Harness {
        pipeline,
        store: Arc::new(MemoryKnowledgeStore::new()),
        model,
        sink,
    }
}

// ─── Deterministic scoring ───────────────────────────────────────

#[tokio::test]
async fn test_guarantee_language_is_non_compliant_even_when_model_misses_it() {
    let h = harness(MockModelClient::compliant(), fast_config());

    let result = h
        .pipeline
        .check(
            "We guarantee you will win your case!",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::NonCompliant);
    assert!(!result.violations.is_empty());
    assert!(result
        .violations
        .iter()
        .any(|v| v.rule_id == "on-guarantee-prohibition" && v.severity == Severity::High));
    // The deterministic violation drags fused confidence below the model's
    assert!(result.confidence_score < 0.92);
    assert!(!result.degraded_context);
}

#[tokio::test]
async fn test_guarantee_content_confirmed_by_model_falls_below_threshold() {
    // The model also flags the guarantee and reports low self-confidence;
    // fused confidence must land under the 0.8 threshold
    let output = ModelOutput {
        assessment: Some(ComplianceStatus::NonCompliant),
        confidence: 0.55,
        violations: vec![Violation {
            rule_id: "on-guarantee-prohibition".into(),
            description: "Promises a guaranteed litigation outcome".into(),
            severity: Severity::High,
            matched_span: None,
        }],
        recommendations: vec!["Remove the outcome guarantee.".into()],
        raw: String::new(),
    };
    let h = harness(MockModelClient::fixed(output), fast_config());

    let result = h
        .pipeline
        .check(
            "Our lawyers guarantee you will win your case.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::NonCompliant);
    // Deterministic hit plus the model's own finding, merged
    assert!(result.violations.len() >= 2);
    assert!(result.confidence_score < 0.8);
}

#[tokio::test]
async fn test_clean_content_is_compliant_with_mandatory_disclaimers() {
    let h = harness(MockModelClient::compliant(), fast_config());

    let result = h
        .pipeline
        .check(
            "Experienced family lawyers serving Toronto since 1998.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::Compliant);
    assert!(result.violations.is_empty());
    // Mandatory disclaimers attach even to compliant results
    assert!(result
        .disclaimers_applied
        .iter()
        .any(|d| d.id == "on-attorney-advertising"));
    assert!(result
        .disclaimers_applied
        .iter()
        .any(|d| d.id == "generic-no-advice"));
    assert!(result.audit_id.starts_with("aud-"));
}

#[tokio::test]
async fn test_identical_requests_score_identically() {
    let h = harness(MockModelClient::compliant(), fast_config());
    let content = "We guarantee satisfaction. Call now!";

    let a = h
        .pipeline
        .check(content, ContentType::MarketingCopy, Jurisdiction::Ontario)
        .await
        .unwrap();
    let b = h
        .pipeline
        .check(content, ContentType::MarketingCopy, Jurisdiction::Ontario)
        .await
        .unwrap();

    assert_eq!(a.status, b.status);
    assert_eq!(a.confidence_score, b.confidence_score);
    assert_eq!(a.violations, b.violations);
    // Distinct runs, distinct trails
    assert_ne!(a.audit_id, b.audit_id);
}

// ─── Request validation ──────────────────────────────────────────

#[tokio::test]
async fn test_empty_content_rejected_before_any_backend_call() {
    let h = harness(MockModelClient::compliant(), fast_config());

    let err = h
        .pipeline
        .check("   ", ContentType::MarketingCopy, Jurisdiction::Ontario)
        .await
        .unwrap_err();

    assert!(matches!(err, ComplianceError::Validation { .. }));
    // Neither knowledge nor model was touched
    assert_eq!(h.store.disclaimer_fetches(), 0);
    assert_eq!(h.model.invocations(), 0);

    // The rejection is still audited, as the sole terminal event
    let events = h.sink.all_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, PipelineStage::Rejected);
}

#[tokio::test]
async fn test_oversized_content_rejected() {
    let h = harness(MockModelClient::compliant(), fast_config());
    let big = "a ".repeat(15_000);

    let err = h
        .pipeline
        .check(&big, ContentType::Other, Jurisdiction::Alberta)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplianceError::Validation { .. }));
    assert_eq!(h.model.invocations(), 0);
}

// ─── Graceful degradation ────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_knowledge_degrades_to_defaults() {
    let h = degraded_harness(MockModelClient::compliant(), fast_config());

    let result = h
        .pipeline
        .check(
            "Our firm assists with incorporations across the province.",
            ContentType::MarketingCopy,
            Jurisdiction::BritishColumbia,
        )
        .await
        .unwrap();

    assert!(result.degraded_context);
    // Built-in defaults still provide mandatory disclaimers
    assert!(result
        .disclaimers_applied
        .iter()
        .any(|d| d.id == "default-not-legal-advice"));

    let events = h.pipeline.audit().events(&result.audit_id).await.unwrap();
    let fetch = events
        .iter()
        .find(|e| e.stage == PipelineStage::ContextFetching)
        .unwrap();
    assert_eq!(fetch.decision, "degraded");
}

#[tokio::test]
async fn test_default_rules_still_catch_guarantees_while_degraded() {
    let h = degraded_harness(MockModelClient::compliant(), fast_config());

    let result = h
        .pipeline
        .check(
            "We guarantee a successful outcome.",
            ContentType::Advertisement,
            Jurisdiction::BritishColumbia,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::NonCompliant);
    assert!(result.degraded_context);
    assert!(result
        .violations
        .iter()
        .any(|v| v.rule_id == "default-no-guarantees"));
}

// ─── Retry, fallback, and failure ────────────────────────────────

#[tokio::test]
async fn test_two_timeouts_then_success_leaves_two_retry_events() {
    let model = MockModelClient::scripted(vec![
        Err(ModelError::Timeout { timeout_secs: 1 }),
        Err(ModelError::Timeout { timeout_secs: 1 }),
        Ok(MockModelClient::compliant_output()),
    ]);
    let h = harness(model, fast_config());

    let result = h
        .pipeline
        .check(
            "Wills and estates services in Ottawa.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::Compliant);
    assert_eq!(h.model.invocations(), 3);

    let events = h.pipeline.audit().events(&result.audit_id).await.unwrap();
    let retries: Vec<_> = events
        .iter()
        .filter(|e| e.stage == PipelineStage::Retrying)
        .collect();
    assert_eq!(retries.len(), 2);
    assert_eq!(retries[0].decision, "retry 1/3");
    assert_eq!(retries[1].decision, "retry 2/3");
}

#[tokio::test]
async fn test_exhausted_retries_surface_generic_error() {
    let model = MockModelClient::scripted(vec![
        Err(ModelError::Timeout { timeout_secs: 1 }),
        Err(ModelError::Timeout { timeout_secs: 1 }),
        Err(ModelError::Timeout { timeout_secs: 1 }),
        Err(ModelError::Timeout { timeout_secs: 1 }),
    ]);
    let h = harness(model, fast_config());

    let err = h
        .pipeline
        .check(
            "Personal injury consultations available.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap_err();

    // Caller sees the generic message; the technical detail is audited
    assert!(matches!(err, ComplianceError::AgentExecution));
    assert_eq!(err.to_string(), "Analysis unavailable, retry later");
    assert_eq!(h.model.invocations(), 4); // initial try + 3 retries

    let events = h.sink.all_events();
    let terminal: Vec<_> = events.iter().filter(|e| e.stage.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].stage, PipelineStage::Failed);
    assert!(terminal[0].detail["error"]
        .as_str()
        .unwrap()
        .contains("timed out"));

    // The retries that led up to the failure are on the trail too
    let retries: Vec<_> = events
        .iter()
        .filter(|e| e.stage == PipelineStage::Retrying)
        .collect();
    assert_eq!(retries.len(), 3);
    assert_eq!(retries[0].decision, "retry 1/3");
    assert_eq!(retries[2].decision, "retry 3/3");
}

#[tokio::test]
async fn test_permanent_error_fails_without_retry() {
    let model = MockModelClient::scripted(vec![Err(ModelError::Auth("bad key".into()))]);
    let h = harness(model, fast_config());

    let err = h
        .pipeline
        .check(
            "Immigration law services.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ComplianceError::AgentExecution));
    assert_eq!(h.model.invocations(), 1);
}

#[tokio::test]
async fn test_fallback_yields_requires_review() {
    let model = MockModelClient::scripted(vec![
        Err(ModelError::Transport("down".into())),
        Err(ModelError::Transport("down".into())),
        Err(ModelError::Transport("down".into())),
        Err(ModelError::Transport("down".into())),
    ]);
    let config = PipelineConfiguration {
        model_fallback_enabled: true,
        ..fast_config()
    };
    let h = harness(model, config);

    let result = h
        .pipeline
        .check(
            "Corporate law services for startups.",
            ContentType::Other,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::RequiresReview);
    assert_eq!(result.confidence_score, 0.0);
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.contains("manual review")));
}

// ─── Model output handling ───────────────────────────────────────

#[tokio::test]
async fn test_model_violations_merge_with_rule_violations() {
    let output = ModelOutput {
        assessment: Some(ComplianceStatus::NonCompliant),
        confidence: 0.7,
        violations: vec![Violation {
            rule_id: "model-misleading-claim".into(),
            description: "Implied certainty of outcome".into(),
            severity: Severity::Medium,
            matched_span: None,
        }],
        recommendations: vec!["Soften the outcome language.".into()],
        raw: String::new(),
    };
    let h = harness(MockModelClient::fixed(output), fast_config());

    let result = h
        .pipeline
        .check(
            "We guarantee the best representation in town.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert_eq!(result.status, ComplianceStatus::NonCompliant);
    // Rule-based first, model-reported after
    assert!(result.violations.len() >= 2);
    assert_eq!(result.violations[0].rule_id, "on-guarantee-prohibition");
    assert!(result
        .violations
        .iter()
        .any(|v| v.rule_id == "model-misleading-claim"));
}

#[tokio::test]
async fn test_low_model_confidence_routes_to_review() {
    let output = ModelOutput {
        assessment: Some(ComplianceStatus::Compliant),
        confidence: 0.3,
        violations: vec![],
        recommendations: vec![],
        raw: String::new(),
    };
    let h = harness(MockModelClient::fixed(output), fast_config());

    let result = h
        .pipeline
        .check(
            "General practice law firm established 1985.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    // No violations, so low confidence means review rather than a verdict
    assert_eq!(result.status, ComplianceStatus::RequiresReview);
    assert!(result.confidence_score < 0.8);
}

// ─── Confidentiality redaction ───────────────────────────────────

#[tokio::test]
async fn test_outbound_recommendations_are_redacted() {
    let output = ModelOutput {
        assessment: Some(ComplianceStatus::Compliant),
        confidence: 0.9,
        violations: vec![],
        recommendations: vec![
            "Replace the contact john.doe@example.com with the firm inbox.".into(),
        ],
        raw: String::new(),
    };
    let h = harness(MockModelClient::fixed(output), fast_config());

    let result = h
        .pipeline
        .check(
            "Reach our team for real-estate closings.",
            ContentType::Other,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    assert!(!result.recommendations[0].contains("john.doe@example.com"));
    assert!(result.recommendations[0].contains("[REDACTED]"));

    let events = h.pipeline.audit().events(&result.audit_id).await.unwrap();
    let redaction = events
        .iter()
        .find(|e| e.stage == PipelineStage::ConfidentialityRedaction)
        .unwrap();
    assert_eq!(redaction.decision, "masked");
}

// ─── Audit trail ─────────────────────────────────────────────────

#[tokio::test]
async fn test_audit_trail_stages_in_order_with_one_terminal() {
    let h = harness(MockModelClient::compliant(), fast_config());

    let result = h
        .pipeline
        .check(
            "Notary services available weekdays.",
            ContentType::SocialPost,
            Jurisdiction::Alberta,
        )
        .await
        .unwrap();

    let events = h.pipeline.audit().events(&result.audit_id).await.unwrap();
    let stages: Vec<PipelineStage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Validating,
            PipelineStage::ContextFetching,
            PipelineStage::Invoking,
            PipelineStage::OutputValidating,
            PipelineStage::RuleScoring,
            PipelineStage::DisclaimerInjection,
            PipelineStage::ConfidentialityRedaction,
            PipelineStage::Finalizing,
            PipelineStage::Completed,
        ]
    );
    assert_eq!(events.iter().filter(|e| e.stage.is_terminal()).count(), 1);

    // All events share the request correlation hash, never the content
    let hash = &events[0].request_hash;
    assert!(events.iter().all(|e| &e.request_hash == hash));
    assert!(events
        .iter()
        .all(|e| !format!("{}", e.detail).contains("Notary services")));
}

#[tokio::test]
async fn test_minimal_detail_keeps_terminal_event_only() {
    let config = PipelineConfiguration {
        audit_detail_level: "minimal".parse().unwrap(),
        ..fast_config()
    };
    let h = harness(MockModelClient::compliant(), config);

    let result = h
        .pipeline
        .check(
            "Family mediation services.",
            ContentType::MarketingCopy,
            Jurisdiction::Ontario,
        )
        .await
        .unwrap();

    let events = h.pipeline.audit().events(&result.audit_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, PipelineStage::Completed);
}

// ─── Concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_checks_share_one_knowledge_load() {
    let h = harness(MockModelClient::compliant(), fast_config());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let pipeline = h.pipeline.clone();
        tasks.push(tokio::spawn(async move {
            pipeline
                .check(
                    &format!("Employment law updates, edition {}.", i),
                    ContentType::MarketingCopy,
                    Jurisdiction::Ontario,
                )
                .await
        }));
    }

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.status, ComplianceStatus::Compliant);
    }

    // Single-flight cache: one load for the shared (ON, marketing) key
    assert_eq!(h.store.disclaimer_fetches(), 1);
}
