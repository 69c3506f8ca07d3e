//! The compliance pipeline
//!
//! One `check` call runs the full sequence: request validation, knowledge
//! fetch, model invocation with retries, output validation, deterministic
//! rule scoring, disclaimer injection, confidentiality redaction, and
//! finalization. Each stage leaves an audit event; every run ends in
//! exactly one terminal event (`Completed`, `Rejected`, `Failed`, or
//! `Cancelled` if the future is dropped mid-flight).
//!
//! Failure semantics: knowledge trouble degrades, model trouble retries and
//! optionally falls back, audit trouble is diverted. The only errors a
//! caller ever sees are `Validation` and `AgentExecution`.

use serde_json::json;
use std::sync::Arc;

use crate::audit::AuditLog;
use crate::config::{PipelineConfiguration, ScoringPolicy};
use crate::error::{ComplianceError, Result};
use crate::knowledge::KnowledgeAggregator;
use crate::model::{ModelPrompt, ModelRunner, RetryAttempt};
use crate::scoring;
use crate::types::{
    new_audit_id, AuditDetailLevel, AuditEvent, ComplianceRequest, ComplianceResult,
    ComplianceStatus, ContentType, Jurisdiction, KnowledgeBundle, PipelineStage, Severity,
    Violation,
};

/// Compliance-aware model execution pipeline
///
/// Cheap to share: all state is behind `Arc`s, and concurrent `check` calls
/// only contend on the knowledge caches and the audit sink.
pub struct CompliancePipeline {
    knowledge: Arc<KnowledgeAggregator>,
    runner: ModelRunner,
    audit: AuditLog,
    threshold: f64,
    scoring: ScoringPolicy,
    max_retries: u32,
}

impl CompliancePipeline {
    pub fn new(
        knowledge: Arc<KnowledgeAggregator>,
        runner: ModelRunner,
        audit: AuditLog,
        config: &PipelineConfiguration,
    ) -> Self {
        Self {
            knowledge,
            runner,
            audit,
            threshold: config.compliance_threshold,
            scoring: config.scoring.clone(),
            max_retries: config.max_model_retries,
        }
    }

    /// Audit front used by this pipeline, for trail retrieval
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Validate raw content and run the full check
    pub async fn check(
        &self,
        content: &str,
        content_type: ContentType,
        jurisdiction: Jurisdiction,
    ) -> Result<ComplianceResult> {
        let audit_id = new_audit_id();

        let request = match ComplianceRequest::new(content, content_type, jurisdiction) {
            Ok(request) => request,
            Err(e) => {
                self.audit
                    .record(AuditEvent::new(
                        &audit_id,
                        "unvalidated",
                        PipelineStage::Rejected,
                        "request validation failed",
                        json!({ "error": e.to_string() }),
                    ))
                    .await;
                return Err(e);
            }
        };

        self.check_request(audit_id, &request).await
    }

    /// Run the full check for an already-validated request
    pub async fn check_request(
        &self,
        audit_id: String,
        request: &ComplianceRequest,
    ) -> Result<ComplianceResult> {
        let hash = request.correlation_hash();
        let mut guard = self.audit.cancel_guard(&audit_id, &hash);

        self.record(
            &audit_id,
            &hash,
            PipelineStage::Validating,
            "proceed",
            json!({
                "contentType": request.content_type(),
                "jurisdiction": request.jurisdiction(),
                "contentBytes": request.content().len(),
            }),
        )
        .await;

        // Stage: knowledge fetch. Never fails; degradation is recorded.
        let bundle = self
            .knowledge
            .fetch(request.jurisdiction(), request.content_type())
            .await;
        let degraded_context = bundle.sections.any_degraded();
        self.record(
            &audit_id,
            &hash,
            PipelineStage::ContextFetching,
            if degraded_context { "degraded" } else { "live" },
            json!({
                "sections": bundle.sections,
                "disclaimers": bundle.disclaimers.len(),
                "rules": bundle.advertising_rules.len(),
                "guidelines": bundle.ethical_guidelines.len(),
            }),
        )
        .await;

        // Stage: model invocation with retry policy.
        let prompt = build_prompt(request, &bundle);
        let invoking_detail = if self.audit.detail_level() == AuditDetailLevel::Verbose {
            json!({ "backend": self.runner.client_name(), "prompt": prompt })
        } else {
            json!({ "backend": self.runner.client_name() })
        };
        self.record(
            &audit_id,
            &hash,
            PipelineStage::Invoking,
            "proceed",
            invoking_detail,
        )
        .await;

        let report = match self.runner.run(&prompt).await {
            Ok(report) => report,
            Err(failure) => {
                // Retries that preceded the failure still belong in the trail
                self.record_retries(&audit_id, &hash, &failure.attempts).await;
                self.record(
                    &audit_id,
                    &hash,
                    PipelineStage::Failed,
                    "model invocation failed",
                    json!({
                        "error": failure.error.to_string(),
                        "transient": failure.error.is_transient(),
                    }),
                )
                .await;
                guard.disarm();
                return Err(ComplianceError::AgentExecution);
            }
        };
        self.record_retries(&audit_id, &hash, &report.attempts).await;

        let output_detail = if self.audit.detail_level() == AuditDetailLevel::Verbose {
            json!({
                "assessment": report.output.assessment,
                "confidence": report.output.confidence,
                "fallback": report.fallback_used,
                "raw": report.output.raw,
            })
        } else {
            json!({
                "assessment": report.output.assessment,
                "confidence": report.output.confidence,
                "fallback": report.fallback_used,
            })
        };
        self.record(
            &audit_id,
            &hash,
            PipelineStage::OutputValidating,
            if report.fallback_used {
                "placeholder accepted"
            } else {
                "schema valid"
            },
            output_detail,
        )
        .await;

        // Stage: deterministic scoring. Runs regardless of the model's own
        // judgment, so a prohibited term is flagged even if the model
        // missed it.
        let rule_violations = scoring::score_rules(request.content(), &bundle, &self.scoring);
        let violations =
            scoring::merge_violations(rule_violations, report.output.violations.clone());
        // A placeholder output carries no real model signal, so nothing is
        // blended in: confidence stays at zero.
        let confidence = if report.fallback_used {
            0.0
        } else {
            scoring::fuse_confidence(report.output.confidence, violations.len(), &self.scoring)
        };
        self.record(
            &audit_id,
            &hash,
            PipelineStage::RuleScoring,
            "scored",
            json!({
                "violations": violations.len(),
                "fusedConfidence": confidence,
                "threshold": self.threshold,
            }),
        )
        .await;

        let status = compute_status(
            &violations,
            confidence,
            self.threshold,
            report.fallback_used,
        );

        // Stage: disclaimer injection.
        let disclaimers_applied = scoring::select_disclaimers(&bundle, status);
        self.record(
            &audit_id,
            &hash,
            PipelineStage::DisclaimerInjection,
            "attached",
            json!({ "count": disclaimers_applied.len() }),
        )
        .await;

        // Stage: confidentiality redaction over outbound model text.
        let (recommendations, violations, masked) =
            redact_outbound(report.output.recommendations.clone(), violations);
        self.record(
            &audit_id,
            &hash,
            PipelineStage::ConfidentialityRedaction,
            if masked { "masked" } else { "clean" },
            serde_json::Value::Null,
        )
        .await;

        let result = ComplianceResult {
            status,
            confidence_score: confidence,
            violations,
            recommendations,
            disclaimers_applied,
            degraded_context,
            audit_id: audit_id.clone(),
        };

        self.record(
            &audit_id,
            &hash,
            PipelineStage::Finalizing,
            "assembled",
            json!({ "status": status, "confidence": confidence }),
        )
        .await;
        self.record(
            &audit_id,
            &hash,
            PipelineStage::Completed,
            &status.to_string(),
            json!({
                "status": status,
                "confidence": confidence,
                "violations": result.violations.len(),
                "degradedContext": degraded_context,
            }),
        )
        .await;
        guard.disarm();

        tracing::info!(
            audit_id = %audit_id,
            status = %status,
            confidence,
            violations = result.violations.len(),
            degraded = degraded_context,
            "Compliance check completed"
        );
        Ok(result)
    }

    async fn record(
        &self,
        audit_id: &str,
        hash: &str,
        stage: PipelineStage,
        decision: &str,
        detail: serde_json::Value,
    ) {
        self.audit
            .record(AuditEvent::new(audit_id, hash, stage, decision, detail))
            .await;
    }

    /// One `Retrying` event per retry that happened, in order
    async fn record_retries(&self, audit_id: &str, hash: &str, attempts: &[RetryAttempt]) {
        for attempt in attempts {
            self.record(
                audit_id,
                hash,
                PipelineStage::Retrying,
                &format!("retry {}/{}", attempt.attempt, self.max_retries),
                json!({ "error": attempt.error, "backoffMs": attempt.backoff_ms }),
            )
            .await;
        }
    }
}

/// Assemble the prompt for one invocation
///
/// The system half carries the knowledge context; the user half is the
/// content under review, untouched.
fn build_prompt(request: &ComplianceRequest, bundle: &KnowledgeBundle) -> ModelPrompt {
    let mut system = String::with_capacity(2048);
    system.push_str(
        "You are a legal-marketing compliance reviewer. Assess the content \
         against the rules and guidelines below and respond with a single \
         JSON object only, shaped as: {\"assessment\": \"COMPLIANT\" | \
         \"NON_COMPLIANT\" | \"REQUIRES_REVIEW\", \"confidence\": <0..1>, \
         \"violations\": [{\"ruleId\": ..., \"description\": ..., \
         \"severity\": \"low\" | \"medium\" | \"high\"}], \
         \"recommendations\": [..]}.\n",
    );

    system.push_str(&format!(
        "\nJurisdiction: {}\nContent type: {}\n",
        bundle.jurisdiction.code(),
        request.content_type(),
    ));

    system.push_str("\nAdvertising rules:\n");
    for rule in &bundle.advertising_rules {
        system.push_str(&format!(
            "- [{}] {} (severity: {:?}, enforced by {})\n",
            rule.rule_id, rule.text, rule.severity, rule.enforcement_body
        ));
    }

    system.push_str("\nEthical guidelines:\n");
    for guideline in &bundle.ethical_guidelines {
        system.push_str(&format!(
            "- [{}] {}: {}\n",
            guideline.guideline_id, guideline.title, guideline.description
        ));
    }

    ModelPrompt {
        system,
        user: request.content().to_string(),
    }
}

/// Resolve the final status from violations, fused confidence, and fallback
///
/// A NON_COMPLIANT status always rides on at least one violation; low
/// confidence alone routes to manual review instead of a hard verdict.
fn compute_status(
    violations: &[Violation],
    confidence: f64,
    threshold: f64,
    fallback_used: bool,
) -> ComplianceStatus {
    let serious = violations.iter().any(|v| v.severity >= Severity::Medium);
    if serious {
        return ComplianceStatus::NonCompliant;
    }
    if confidence < threshold && !violations.is_empty() {
        return ComplianceStatus::NonCompliant;
    }
    if confidence < threshold || !violations.is_empty() || fallback_used {
        return ComplianceStatus::RequiresReview;
    }
    ComplianceStatus::Compliant
}

/// Redact confidential identifiers from all outbound text fields
fn redact_outbound(
    recommendations: Vec<String>,
    violations: Vec<Violation>,
) -> (Vec<String>, Vec<Violation>, bool) {
    let mut masked = false;

    let recommendations = recommendations
        .into_iter()
        .map(|r| {
            let (text, changed) = scoring::redact(&r);
            masked |= changed;
            text
        })
        .collect();

    let violations = violations
        .into_iter()
        .map(|mut v| {
            let (text, changed) = scoring::redact(&v.description);
            if changed {
                // Byte offsets no longer line up with the rewritten text
                v.matched_span = None;
                masked = true;
            }
            v.description = text;
            v
        })
        .collect();

    (recommendations, violations, masked)
}
