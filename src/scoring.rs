//! Deterministic rule scoring, confidence fusion, and redaction
//!
//! Everything in this module is pure: the same content, bundle, and policy
//! always produce the same violations, the same fused confidence, and the
//! same redacted text. The deterministic layer runs regardless of what the
//! model said, so a prohibited term is flagged even when the model missed it.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::{ConfidenceFusion, ScoringPolicy, TermMatchMode};
use crate::types::{ComplianceStatus, Disclaimer, KnowledgeBundle, Violation};

pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Scan content against the bundle's advertising rules
///
/// Each prohibited term that appears in the content yields one violation
/// carrying the byte span of the first occurrence. Violations come out in
/// bundle order, then term order, so output is stable across runs.
pub fn score_rules(
    content: &str,
    bundle: &KnowledgeBundle,
    policy: &ScoringPolicy,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for rule in &bundle.advertising_rules {
        for term in &rule.prohibited_terms {
            if let Some(span) = find_term(content, term, policy.term_match_mode) {
                violations.push(Violation {
                    rule_id: rule.rule_id.clone(),
                    description: format!(
                        "prohibited term \"{}\" ({}): {}",
                        term, rule.category, rule.text
                    ),
                    severity: rule.severity,
                    matched_span: Some(span),
                });
            }
        }
    }

    violations
}

fn find_term(content: &str, term: &str, mode: TermMatchMode) -> Option<(usize, usize)> {
    match mode {
        TermMatchMode::WordBoundary => {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
            match Regex::new(&pattern) {
                Ok(re) => re.find(content).map(|m| (m.start(), m.end())),
                Err(e) => {
                    tracing::warn!(term, error = %e, "Skipping unmatchable prohibited term");
                    None
                }
            }
        }
        TermMatchMode::Substring => {
            let haystack = content.to_lowercase();
            let needle = term.to_lowercase();
            haystack.find(&needle).map(|start| (start, start + needle.len()))
        }
    }
}

/// Merge model-reported violations into the rule-based set
///
/// Rule-based violations come first; a model violation that duplicates one
/// already present (same rule id and description) is dropped.
pub fn merge_violations(
    rule_violations: Vec<Violation>,
    model_violations: Vec<Violation>,
) -> Vec<Violation> {
    let mut merged = rule_violations;
    for violation in model_violations {
        let duplicate = merged
            .iter()
            .any(|v| v.rule_id == violation.rule_id && v.description == violation.description);
        if !duplicate {
            merged.push(violation);
        }
    }
    merged
}

/// Combine model confidence with the deterministic rule score
///
/// The rule score is `max(0, 1 - penalty * violations)`; fusion per policy,
/// clamped to [0, 1].
pub fn fuse_confidence(
    model_confidence: f64,
    violation_count: usize,
    policy: &ScoringPolicy,
) -> f64 {
    let rule_score = (1.0 - policy.violation_penalty * violation_count as f64).max(0.0);
    let fused = match policy.fusion {
        ConfidenceFusion::Weighted { model_weight } => {
            model_weight * model_confidence + (1.0 - model_weight) * rule_score
        }
        ConfidenceFusion::TakeMinimum => model_confidence.min(rule_score),
    };
    fused.clamp(0.0, 1.0)
}

/// Select the disclaimers to attach to a result
///
/// Mandatory disclaimers are attached unconditionally. Advisory ones are
/// attached only when the content did not come out compliant, where extra
/// caution costs nothing.
pub fn select_disclaimers(
    bundle: &KnowledgeBundle,
    status: ComplianceStatus,
) -> Vec<Disclaimer> {
    bundle
        .disclaimers
        .iter()
        .filter(|d| d.mandatory || status != ComplianceStatus::Compliant)
        .cloned()
        .collect()
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("hardcoded pattern")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]\d{4}\b")
            .expect("hardcoded pattern")
    })
}

fn sin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}[\s-]\d{3}[\s-]\d{3}\b").expect("hardcoded pattern"))
}

fn client_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b([Oo]ur client|[Oo]n behalf of)\s+[A-Z][A-Za-z.'-]*(?:\s+[A-Z][A-Za-z.'-]*)*",
        )
        .expect("hardcoded pattern")
    })
}

/// Mask confidential identifiers in outbound text
///
/// Emails, phone numbers, SIN-style digit groups, and client names following
/// phrases like "our client" are replaced with [`REDACTION_MARKER`]. Returns
/// the redacted text and whether anything was masked.
pub fn redact(text: &str) -> (String, bool) {
    let mut out = text.to_string();
    let mut changed = false;

    for re in [email_re(), phone_re(), sin_re()] {
        if re.is_match(&out) {
            out = re.replace_all(&out, REDACTION_MARKER).into_owned();
            changed = true;
        }
    }

    if client_name_re().is_match(&out) {
        out = client_name_re()
            .replace_all(&out, format!("$1 {}", REDACTION_MARKER))
            .into_owned();
        changed = true;
    }

    (out, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdvertisingRule, DisclaimerPosition, Jurisdiction, Severity};

    fn bundle_with_rules(rules: Vec<AdvertisingRule>) -> KnowledgeBundle {
        let mut bundle = KnowledgeBundle::empty(Jurisdiction::Ontario);
        bundle.advertising_rules = rules;
        bundle
    }

    fn guarantee_rule() -> AdvertisingRule {
        AdvertisingRule {
            rule_id: "no-guarantees".into(),
            text: "Outcome guarantees are prohibited.".into(),
            category: "guarantees".into(),
            prohibited_terms: vec!["guarantee".into(), "we always win".into()],
            severity: Severity::High,
            jurisdiction: Some(Jurisdiction::Ontario),
            applies_to: vec![],
            enforcement_body: "Law Society of Ontario".into(),
        }
    }

    #[test]
    fn test_word_boundary_matching() {
        let bundle = bundle_with_rules(vec![guarantee_rule()]);
        let policy = ScoringPolicy::default();

        let hits = score_rules("We GUARANTEE a win.", &bundle, &policy);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule_id, "no-guarantees");
        assert_eq!(hits[0].severity, Severity::High);
        assert_eq!(hits[0].matched_span, Some((3, 12)));

        // "guaranteed" does not match "guarantee" on a word boundary
        let misses = score_rules("Results are never guaranteed.", &bundle, &policy);
        assert!(misses.is_empty());
    }

    #[test]
    fn test_substring_matching() {
        let bundle = bundle_with_rules(vec![guarantee_rule()]);
        let policy = ScoringPolicy {
            term_match_mode: TermMatchMode::Substring,
            ..ScoringPolicy::default()
        };

        let hits = score_rules("Results are never Guaranteed.", &bundle, &policy);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_span, Some((18, 27)));
    }

    #[test]
    fn test_multi_word_term() {
        let bundle = bundle_with_rules(vec![guarantee_rule()]);
        let hits = score_rules(
            "Choose us because we always win our cases.",
            &bundle,
            &ScoringPolicy::default(),
        );
        assert_eq!(hits.len(), 1);
        assert!(hits[0].description.contains("we always win"));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let bundle = bundle_with_rules(vec![guarantee_rule()]);
        let policy = ScoringPolicy::default();
        let content = "We guarantee results. We always win.";

        let a = score_rules(content, &bundle, &policy);
        let b = score_rules(content, &bundle, &policy);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_merge_drops_duplicate_model_violations() {
        let rule = vec![Violation {
            rule_id: "r1".into(),
            description: "found it".into(),
            severity: Severity::High,
            matched_span: Some((0, 5)),
        }];
        let model = vec![
            Violation {
                rule_id: "r1".into(),
                description: "found it".into(),
                severity: Severity::High,
                matched_span: None,
            },
            Violation {
                rule_id: "r2".into(),
                description: "model-only concern".into(),
                severity: Severity::Low,
                matched_span: None,
            },
        ];

        let merged = merge_violations(rule, model);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].rule_id, "r1");
        // The deterministic span survives the merge
        assert_eq!(merged[0].matched_span, Some((0, 5)));
        assert_eq!(merged[1].rule_id, "r2");
    }

    #[test]
    fn test_weighted_fusion() {
        let policy = ScoringPolicy::default(); // weight 0.6, penalty 0.2

        // No violations: rule score 1.0
        let fused = fuse_confidence(0.9, 0, &policy);
        assert!((fused - (0.6 * 0.9 + 0.4 * 1.0)).abs() < 1e-9);

        // Two violations: rule score 0.6
        let fused = fuse_confidence(0.9, 2, &policy);
        assert!((fused - (0.6 * 0.9 + 0.4 * 0.6)).abs() < 1e-9);
    }

    #[test]
    fn test_minimum_fusion_and_floor() {
        let policy = ScoringPolicy {
            fusion: ConfidenceFusion::TakeMinimum,
            ..ScoringPolicy::default()
        };
        assert!((fuse_confidence(0.9, 1, &policy) - 0.8).abs() < 1e-9);
        assert!((fuse_confidence(0.3, 1, &policy) - 0.3).abs() < 1e-9);

        // Rule score floors at zero even with many violations
        assert_eq!(fuse_confidence(1.0, 50, &policy), 0.0);
    }

    #[test]
    fn test_select_disclaimers_by_status() {
        let mut bundle = KnowledgeBundle::empty(Jurisdiction::Ontario);
        bundle.disclaimers = vec![
            Disclaimer {
                id: "must".into(),
                text: "Mandatory".into(),
                jurisdiction: None,
                applies_to: vec![],
                mandatory: true,
                position: DisclaimerPosition::Footer,
            },
            Disclaimer {
                id: "should".into(),
                text: "Advisory".into(),
                jurisdiction: None,
                applies_to: vec![],
                mandatory: false,
                position: DisclaimerPosition::Footer,
            },
        ];

        let compliant = select_disclaimers(&bundle, ComplianceStatus::Compliant);
        assert_eq!(compliant.len(), 1);
        assert_eq!(compliant[0].id, "must");

        let flagged = select_disclaimers(&bundle, ComplianceStatus::NonCompliant);
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn test_redact_email_and_phone() {
        let (out, changed) =
            redact("Contact john.doe@example.com or call 416-555-1234 today.");
        assert!(changed);
        assert!(!out.contains("john.doe@example.com"));
        assert!(!out.contains("416-555-1234"));
        assert_eq!(out.matches(REDACTION_MARKER).count(), 2);
    }

    #[test]
    fn test_redact_sin() {
        let (out, changed) = redact("SIN 123-456-789 on file.");
        assert!(changed);
        assert_eq!(out, format!("SIN {} on file.", REDACTION_MARKER));
    }

    #[test]
    fn test_redact_client_name() {
        let (out, changed) = redact("We acted on behalf of Jane Smith in this matter.");
        assert!(changed);
        assert!(!out.contains("Jane Smith"));
        assert!(out.contains(&format!("on behalf of {}", REDACTION_MARKER)));
    }

    #[test]
    fn test_clean_text_untouched() {
        let text = "Our firm handles employment disputes across Ontario.";
        let (out, changed) = redact(text);
        assert!(!changed);
        assert_eq!(out, text);
    }
}
