//! Learned confidence bias.
//!
//! Human corrections accumulate a per-field adjustment in the learning
//! model. A `ConfidenceBias` exposes those adjustments to the resolver,
//! which subtracts them from a strategy's final confidence when
//! `apply_learned_adjustments` is enabled. Fields people keep correcting
//! therefore reach the review threshold sooner.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Source of per-field confidence adjustments.
pub trait ConfidenceBias: Send + Sync {
    /// Name of the bias source (for diagnostics).
    fn name(&self) -> &str;

    /// Non-negative adjustment for a field, if any has been learned.
    fn adjustment(&self, field_name: &str) -> Option<f64>;
}

/// Applies an adjustment to a confidence, clamped to [0.0, 1.0].
#[must_use]
pub fn apply_adjustment(confidence: f64, adjustment: f64) -> f64 {
    (confidence - adjustment.max(0.0)).clamp(0.0, 1.0)
}

/// Fixed adjustments held in memory.
///
/// Useful when adjustments come from an offline retraining job rather than
/// a live correction engine.
#[derive(Debug, Default)]
pub struct StaticBias {
    adjustments: RwLock<HashMap<String, f64>>,
}

impl StaticBias {
    /// Creates a bias with no adjustments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the adjustment for a field. Negative values are stored as zero.
    pub fn set(&self, field_name: impl Into<String>, adjustment: f64) {
        let mut guard = self.adjustments.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(field_name.into(), adjustment.max(0.0));
    }
}

impl ConfidenceBias for StaticBias {
    fn name(&self) -> &str {
        "static_bias"
    }

    fn adjustment(&self, field_name: &str) -> Option<f64> {
        let guard = self.adjustments.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(field_name).copied()
    }
}
