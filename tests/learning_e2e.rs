//! End-to-end correction learning tests.
//!
//! These tests verify that:
//! - Corrections are weighed and escalate into patterns
//! - Learned adjustments feed back into resolution when enabled
//! - Insights reflect the accumulated model

use std::sync::Arc;

use adjudicator::{
    CandidateValue, ConfidenceBias, ConfidenceLevel, ConflictContext, ConflictResolutionConfig, ConflictResolver,
    Correction, CorrectionEngine, CorrectionEngineConfig, CorrectionType, PatternId,
};
use serde_json::json;

fn engine() -> CorrectionEngine {
    CorrectionEngine::new(CorrectionEngineConfig::default()).unwrap()
}

fn rate_fix(user: &str) -> Correction {
    Correction::new("deal-9", "interest_rate", CorrectionType::FieldValue, user)
        .with_document("doc-1")
        .with_template("loan_agreement")
        .with_values(json!("5.25%"), json!("5.75%"))
}

#[test]
fn test_confident_correction_gets_floor_weight() {
    let engine = engine();
    let stored = engine
        .submit_correction(rate_fix("analyst").with_original_confidence(0.9))
        .unwrap();
    assert!((stored.learning_weight - 0.1).abs() < 1e-12);
}

#[test]
fn test_pattern_escalation_thresholds() {
    let engine = engine();
    let id = PatternId::for_key(CorrectionType::FieldValue, "interest_rate");
    let mut seen = Vec::new();
    for i in 0..10 {
        engine.submit_correction(rate_fix(&format!("user-{i}"))).unwrap();
        seen.push(engine.pattern(id).unwrap().confidence_level);
    }
    assert_eq!(seen[2], ConfidenceLevel::Medium);
    assert_eq!(seen[4], ConfidenceLevel::High);
    assert_eq!(seen[9], ConfidenceLevel::VeryHigh);
    assert_eq!(engine.pattern(id).unwrap().frequency_count, 10);
}

#[test]
fn test_category_correction_without_field() {
    let engine = engine();
    let stored = engine
        .submit_correction(Correction::new("deal-9", "", CorrectionType::Category, "analyst"))
        .unwrap();
    assert!((stored.learning_weight - 1.1).abs() < 1e-12);
    assert!(engine.learning_model().confidence_adjustments.is_empty());

    let err = engine
        .submit_correction(Correction::new("deal-9", "", CorrectionType::Formula, "analyst"))
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_learned_adjustment_flows_into_resolver() {
    let engine = Arc::new(engine());
    for i in 0..8 {
        engine.submit_correction(rate_fix(&format!("user-{i}"))).unwrap();
    }
    // 8 corrections x 0.8 weight x 0.1 factor
    let adjustment = engine.adjustment("interest_rate").unwrap();
    assert!((adjustment - 0.64).abs() < 1e-9);

    let config = ConflictResolutionConfig {
        apply_learned_adjustments: true,
        ..ConflictResolutionConfig::default()
    };
    let resolver = ConflictResolver::new(config)
        .unwrap()
        .with_bias(Arc::clone(&engine) as Arc<dyn ConfidenceBias>);

    let context = ConflictContext::builder()
        .deal("deal-10")
        .template("loan_agreement")
        .field("interest_rate", "percentage")
        .candidate(CandidateValue::new(json!("5.25%"), 0.95).unwrap())
        .candidate(CandidateValue::new(json!("5.75%"), 0.6).unwrap())
        .build()
        .unwrap();
    let outcome = resolver.resolve(&context).unwrap();

    assert!((outcome.final_confidence - 0.31).abs() < 1e-9);
    assert!(outcome.requires_review);
    assert_eq!(outcome.diagnostics["bias_source"], json!("correction_engine"));
}

#[test]
fn test_insights_recommend_review_for_hot_fields() {
    let engine = engine();
    for i in 0..6 {
        engine.submit_correction(rate_fix(&format!("user-{i}"))).unwrap();
    }
    engine.run_maintenance().unwrap();

    let insights = engine.learning_insights();
    assert_eq!(insights.total_corrections, 6);
    assert_eq!(insights.active_patterns, 1);
    assert_eq!(insights.top_corrections_by_type[0].correction_type, CorrectionType::FieldValue);
    assert!(insights
        .recommended_actions
        .iter()
        .any(|a| a.contains("interest_rate")));
}

#[test]
fn test_outcomes_change_success_rate_only_through_api() {
    let engine = engine();
    engine.submit_correction(rate_fix("a")).unwrap();
    let id = PatternId::for_key(CorrectionType::FieldValue, "interest_rate");
    let before = engine.pattern(id).unwrap().success_rate;

    engine.submit_correction(rate_fix("b")).unwrap();
    assert_eq!(engine.pattern(id).unwrap().success_rate, before);

    let updated = engine.record_pattern_outcome(id, true).unwrap();
    assert_eq!(updated.success_rate, 1.0);
}
