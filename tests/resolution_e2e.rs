//! End-to-end resolution tests.
//!
//! These tests drive the public resolver API through:
//! - The classic extraction conflicts (confidence spread, duplicates)
//! - Review, override and statistics flows
//! - Concurrent callers sharing one resolver

use std::sync::Arc;
use std::thread;

use adjudicator::{
    AuditAction, CandidateValue, ConflictContext, ConflictResolutionConfig, ConflictResolver, ConflictType,
    StrategyKind,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

fn cand(value: Value, confidence: f64, method: &str) -> CandidateValue {
    CandidateValue::new(value, confidence).unwrap().with_method(method)
}

fn loan_amount(candidates: Vec<CandidateValue>) -> ConflictContext {
    ConflictContext::builder()
        .deal("deal-100")
        .template("loan_agreement")
        .field("loan_amount", "number")
        .candidates(candidates)
        .build()
        .unwrap()
}

#[test]
fn test_ocr_disagreement_resolved_by_confidence() {
    let resolver = ConflictResolver::new(ConflictResolutionConfig::default()).unwrap();
    let context = loan_amount(vec![
        cand(json!("120000"), 0.6, "ocr_standard"),
        cand(json!("125000"), 0.9, "manual_entry"),
        cand(json!("125000"), 0.55, "nlp_extraction"),
    ]);

    let outcome = resolver.resolve(&context).unwrap();
    assert_eq!(outcome.resolved_value, json!("125000"));
    assert!((outcome.final_confidence - 0.9).abs() < 1e-12);
    assert!(!outcome.requires_review);
    assert_eq!(outcome.strategy_key, StrategyKind::HighestConfidence.key());

    let history = resolver.conflict_history("deal-100", "loan_agreement", "loan_amount");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].conflict_type, ConflictType::Confidence);
    assert_eq!(history[0].candidates.len(), 3);
}

#[test]
fn test_duplicate_values_take_best_confidence() {
    let resolver = ConflictResolver::new(ConflictResolutionConfig::default()).unwrap();
    let context = loan_amount(vec![cand(json!("100"), 0.5, "ocr_standard"), cand(json!("100"), 0.9, "ai_extraction")]);

    let outcome = resolver.resolve(&context).unwrap();
    assert_eq!(outcome.resolved_value, json!("100"));
    assert!((outcome.final_confidence - 0.9).abs() < 1e-12);

    let history = resolver.conflict_history("deal-100", "loan_agreement", "loan_amount");
    assert_eq!(history[0].conflict_type, ConflictType::Duplicate);
}

#[test]
fn test_currency_strings_averaged_with_override() {
    let mut config = ConflictResolutionConfig::default();
    config
        .type_specific_strategies
        .insert("currency".to_string(), "numeric_averaging".to_string());
    let resolver = ConflictResolver::new(config).unwrap();

    let context = ConflictContext::builder()
        .deal("deal-100")
        .template("rent_roll")
        .field("monthly_rent", "currency")
        .candidate(cand(json!("$1,000.00"), 0.5, "ocr_standard"))
        .candidate(cand(json!(2000), 0.5, "api_integration"))
        .candidate(cand(json!("illegible"), 0.9, "ocr_standard"))
        .build()
        .unwrap();

    let outcome = resolver.resolve(&context).unwrap();
    assert_eq!(outcome.strategy_key, "numeric_averaging");
    assert_eq!(outcome.resolved_value, json!(1500.0));
    assert_eq!(outcome.diagnostics["skipped_values"], json!(1));
}

#[test]
fn test_latest_value_for_dates() {
    let resolver = ConflictResolver::new(ConflictResolutionConfig::default()).unwrap();
    let now = Utc::now();
    let context = ConflictContext::builder()
        .deal("deal-100")
        .template("loan_agreement")
        .field("maturity_date", "date")
        .candidate(cand(json!("2030-01-01"), 0.95, "ocr_standard").observed_at(now - Duration::hours(2)))
        .candidate(cand(json!("2031-01-01"), 0.7, "human_review").observed_at(now))
        .build()
        .unwrap();

    let outcome = resolver.resolve(&context).unwrap();
    assert_eq!(outcome.strategy_key, "latest_value");
    assert_eq!(outcome.resolved_value, json!("2031-01-01"));
}

#[test]
fn test_review_then_override_flow() {
    let resolver = ConflictResolver::new(ConflictResolutionConfig::default()).unwrap();
    let context = loan_amount(vec![cand(json!("120000"), 0.3, "ocr_standard"), cand(json!("125000"), 0.4, "heuristic")]);

    let outcome = resolver.resolve(&context).unwrap();
    assert!(outcome.requires_review);
    assert_eq!(outcome.strategy_key, "manual_review");

    let record = resolver
        .conflict_history("deal-100", "loan_agreement", "loan_amount")
        .pop()
        .unwrap();
    let reviewed = resolver.mark_reviewed(record.id, "analyst-7", "checked the note").unwrap();
    assert!(!reviewed.requires_review);

    let overridden = resolver
        .override_resolution("deal-100", "loan_agreement", "loan_amount", json!("124500"), "analyst-7", "per closing statement")
        .unwrap();
    assert_eq!(overridden.resolved_by, "analyst-7");

    let actions: Vec<AuditAction> = resolver.audit_trail(None).into_iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Detected,
            AuditAction::Resolved,
            AuditAction::Reviewed,
            AuditAction::Overridden
        ]
    );

    let stats = resolver.statistics();
    assert_eq!(stats.total_resolutions, 2);
    assert_eq!(stats.by_strategy["manual_review"], 1);
    assert_eq!(stats.by_strategy["manual_override"], 1);
    assert_eq!(stats.review_rate, 0.0);
}

#[test]
fn test_deal_history_groups_fields() {
    let resolver = ConflictResolver::new(ConflictResolutionConfig::default()).unwrap();
    for field in ["loan_amount", "interest_rate", "borrower"] {
        let context = ConflictContext::builder()
            .deal("deal-100")
            .template("loan_agreement")
            .field(field, "text")
            .candidate(cand(json!("a"), 0.9, "ocr_standard"))
            .candidate(cand(json!("b"), 0.6, "ocr_standard"))
            .build()
            .unwrap();
        resolver.resolve(&context).unwrap();
    }
    let other = ConflictContext::builder()
        .deal("deal-1000")
        .template("loan_agreement")
        .field("loan_amount", "text")
        .candidate(cand(json!("a"), 0.9, "ocr_standard"))
        .build()
        .unwrap();
    resolver.resolve(&other).unwrap();

    let deal = resolver.deal_history("deal-100");
    assert_eq!(deal.len(), 3);
    assert!(deal.contains_key("deal-100:loan_agreement:interest_rate"));
}

#[test]
fn test_concurrent_resolves_keep_audit_pairs() {
    let resolver = Arc::new(ConflictResolver::new(ConflictResolutionConfig::default()).unwrap());
    let mut handles = Vec::new();
    for t in 0..4 {
        let resolver = Arc::clone(&resolver);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let context = ConflictContext::builder()
                    .deal(format!("deal-{t}"))
                    .template("rent_roll")
                    .field(format!("unit_{i}"), "text")
                    .candidate(cand(json!("x"), 0.9, "ocr_standard"))
                    .candidate(cand(json!("y"), 0.6, "ocr_standard"))
                    .build()
                    .unwrap();
                resolver.resolve(&context).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(resolver.statistics().total_resolutions, 100);
    let trail = resolver.audit_trail(None);
    assert_eq!(trail.len(), 200);
    for pair in trail.chunks(2) {
        assert_eq!(pair[0].action, AuditAction::Detected);
        assert_eq!(pair[1].action, AuditAction::Resolved);
        assert_eq!(pair[0].conflict_id, pair[1].conflict_id);
    }
}
