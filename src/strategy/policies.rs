use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::candidate::{CandidateValue, ConflictContext};
use crate::conflict::confidence_spread;
use crate::error::ResolutionError;
use crate::value;

use super::source_priority::{composite_score, method_priority};
use super::{ResolutionOutcome, StrategyKind, StrategyParams};

fn base_diagnostics(context: &ConflictContext, params: &StrategyParams) -> BTreeMap<String, Value> {
    let candidates = &context.candidates;
    let below_min = candidates
        .iter()
        .filter(|c| c.confidence < params.min_confidence_threshold)
        .count();

    let mut diagnostics = BTreeMap::new();
    diagnostics.insert("candidate_count".to_string(), json!(candidates.len()));
    diagnostics.insert("confidence_spread".to_string(), json!(confidence_spread(candidates)));
    diagnostics.insert("below_min_confidence".to_string(), json!(below_min));
    if params.debug {
        let detail: Vec<Value> = candidates
            .iter()
            .map(|c| {
                json!({
                    "value": c.value,
                    "confidence": c.confidence,
                    "source": c.source,
                    "method": c.method,
                    "observed_at": c.observed_at,
                })
            })
            .collect();
        diagnostics.insert("candidates".to_string(), Value::Array(detail));
    }
    diagnostics
}

/// Margin between the winner and the best candidate proposing a different value.
fn contested_margin(winner: &CandidateValue, ranked: &[&CandidateValue]) -> Option<f64> {
    ranked
        .iter()
        .find(|c| !value::loosely_equal(&c.value, &winner.value))
        .map(|runner_up| winner.confidence - runner_up.confidence)
}

fn describe(winner: &CandidateValue) -> String {
    format!(
        "value from {} via {} at confidence {:.2}",
        winner.source, winner.method, winner.confidence
    )
}

pub(super) fn highest_confidence(context: &ConflictContext, params: &StrategyParams) -> ResolutionOutcome {
    let kind = StrategyKind::HighestConfidence;
    let mut ranked: Vec<&CandidateValue> = context.candidates.iter().collect();
    // Stable: equal confidences keep input order.
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let winner = ranked[0];
    let mut diagnostics = base_diagnostics(context, params);
    let mut notes = format!("Selected highest-confidence {}", describe(winner));

    if let Some(margin) = contested_margin(winner, &ranked) {
        diagnostics.insert("winning_margin".to_string(), json!(margin));
        if margin < kind.min_confidence_diff() {
            notes.push_str("; narrow margin over a competing value");
        }
    }

    ResolutionOutcome {
        resolved_value: winner.value.clone(),
        strategy_key: kind.key().to_string(),
        final_confidence: winner.confidence,
        requires_review: winner.confidence < params.review_threshold,
        notes,
        diagnostics,
    }
}

pub(super) fn numeric_averaging(
    context: &ConflictContext,
    params: &StrategyParams,
) -> Result<ResolutionOutcome, ResolutionError> {
    let kind = StrategyKind::NumericAveraging;
    let candidates = &context.candidates;

    let mut parsed: Vec<(f64, f64)> = candidates
        .iter()
        .filter_map(|c| value::parse_number(&c.value).map(|v| (v, c.confidence)))
        .collect();
    if parsed.is_empty() {
        return Err(ResolutionError::NoValidNumericValues {
            candidates: candidates.len(),
        });
    }

    // Sum in a canonical order so the result does not depend on input order.
    parsed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let total_weight: f64 = parsed.iter().map(|(_, c)| c).sum();
    if total_weight <= 0.0 {
        return Err(ResolutionError::ZeroConfidenceWeight {
            candidates: parsed.len(),
        });
    }

    let weighted_sum: f64 = parsed.iter().map(|(v, c)| v * c).sum();
    let raw_average = weighted_sum / total_weight;
    let average = serde_json::Number::from_f64(value::round_to(raw_average, 2)).ok_or(
        ResolutionError::NonFiniteAverage {
            candidates: parsed.len(),
        },
    )?;
    #[allow(clippy::cast_precision_loss)]
    let mean_confidence = (total_weight / parsed.len() as f64).clamp(0.0, 1.0);

    let skipped = candidates.len() - parsed.len();
    let mut diagnostics = base_diagnostics(context, params);
    diagnostics.insert("valid_values".to_string(), json!(parsed.len()));
    diagnostics.insert("skipped_values".to_string(), json!(skipped));
    diagnostics.insert("total_weight".to_string(), json!(total_weight));
    diagnostics.insert("raw_average".to_string(), json!(raw_average));

    let mut notes = format!(
        "Confidence-weighted average of {} numeric values",
        parsed.len()
    );
    if skipped > 0 {
        notes.push_str(&format!("; skipped {skipped} non-numeric"));
    }

    Ok(ResolutionOutcome {
        resolved_value: Value::Number(average),
        strategy_key: kind.key().to_string(),
        final_confidence: mean_confidence,
        requires_review: mean_confidence < params.review_threshold,
        notes,
        diagnostics,
    })
}

pub(super) fn latest_value(context: &ConflictContext, params: &StrategyParams) -> ResolutionOutcome {
    let mut ranked: Vec<&CandidateValue> = context.candidates.iter().collect();
    ranked.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));

    let winner = ranked[0];
    let mut diagnostics = base_diagnostics(context, params);
    diagnostics.insert("latest_observed_at".to_string(), json!(winner.observed_at));

    ResolutionOutcome {
        resolved_value: winner.value.clone(),
        strategy_key: StrategyKind::LatestValue.key().to_string(),
        final_confidence: winner.confidence,
        requires_review: winner.confidence < params.review_threshold,
        notes: format!("Selected most recent {}", describe(winner)),
        diagnostics,
    }
}

pub(super) fn manual_review(context: &ConflictContext) -> ResolutionOutcome {
    let placeholder = context
        .candidates
        .first()
        .map_or(Value::Null, |c| c.value.clone());
    let reason = if context.requires_review {
        "review requested by caller"
    } else {
        "candidate confidence below review threshold"
    };

    let mut diagnostics = BTreeMap::new();
    diagnostics.insert("candidate_count".to_string(), json!(context.candidates.len()));
    diagnostics.insert("max_confidence".to_string(), json!(context.max_confidence()));
    diagnostics.insert("reason".to_string(), json!(reason));

    ResolutionOutcome {
        resolved_value: placeholder,
        strategy_key: StrategyKind::ManualReview.key().to_string(),
        final_confidence: 0.0,
        requires_review: true,
        notes: format!("Manual review required: {reason}; first candidate held as placeholder"),
        diagnostics,
    }
}

pub(super) fn source_priority(context: &ConflictContext, params: &StrategyParams) -> ResolutionOutcome {
    let kind = StrategyKind::SourcePriority;
    let mut best = &context.candidates[0];
    let mut best_score = composite_score(&best.method, best.confidence);
    for candidate in &context.candidates[1..] {
        let score = composite_score(&candidate.method, candidate.confidence);
        // Strictly greater: ties keep the earlier candidate.
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }

    let mut diagnostics = base_diagnostics(context, params);
    diagnostics.insert("method_priority".to_string(), json!(method_priority(&best.method)));
    diagnostics.insert("composite_score".to_string(), json!(best_score));

    ResolutionOutcome {
        resolved_value: best.value.clone(),
        strategy_key: kind.key().to_string(),
        final_confidence: best.confidence,
        requires_review: best.confidence < params.review_threshold,
        notes: format!("Selected by source priority {}", describe(best)),
        diagnostics,
    }
}
