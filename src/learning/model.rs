//! The learning model and its persisted form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::correction::{Correction, CorrectionType};
use super::pattern::{ConfidenceLevel, LearningPattern};

/// Schema version written into `learning_state.json`.
pub const MODEL_VERSION: u32 = 1;

/// Adjustments at or above this mark a field for manual review.
const HIGH_ADJUSTMENT: f64 = 0.25;

/// Effectiveness below this (when measured) triggers a recommendation.
const LOW_EFFECTIVENESS: f64 = 0.5;

/// Number of correction types listed in insights.
const TOP_TYPES: usize = 3;

/// Aggregated learning state, one per correction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningModel {
    /// Schema version, see [`MODEL_VERSION`].
    pub version: u32,

    /// Accepted corrections since the last reset.
    pub total_corrections: u64,

    /// Active patterns as of the last save or maintenance cycle.
    #[serde(default)]
    pub active_patterns: Vec<LearningPattern>,

    /// Field name → amount subtracted from resolver confidence.
    #[serde(default)]
    pub confidence_adjustments: BTreeMap<String, f64>,

    /// Health counters.
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
}

impl Default for LearningModel {
    fn default() -> Self {
        Self {
            version: MODEL_VERSION,
            total_corrections: 0,
            active_patterns: Vec::new(),
            confidence_adjustments: BTreeMap::new(),
            performance_metrics: PerformanceMetrics::default(),
        }
    }
}

impl LearningModel {
    /// Folds an accepted correction into the counters.
    pub(crate) fn absorb(&mut self, correction: &Correction, adjustment_factor: f64) {
        self.total_corrections += 1;

        let metrics = &mut self.performance_metrics;
        *metrics
            .corrections_by_type
            .entry(correction.correction_type)
            .or_default() += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.total_corrections as f64;
        metrics.average_learning_weight += (correction.learning_weight - metrics.average_learning_weight) / n;

        if !correction.field_name.is_empty() {
            *self
                .confidence_adjustments
                .entry(correction.field_name.clone())
                .or_default() += correction.learning_weight * adjustment_factor;
        }
    }

    /// Derives insights and recommendations from the model.
    #[must_use]
    pub fn insights(&self) -> LearningInsights {
        let mut top: Vec<TypeCount> = self
            .performance_metrics
            .corrections_by_type
            .iter()
            .map(|(t, n)| TypeCount {
                correction_type: *t,
                count: *n,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then(a.correction_type.cmp(&b.correction_type)));
        top.truncate(TOP_TYPES);

        LearningInsights {
            total_corrections: self.total_corrections,
            active_patterns: self.active_patterns.len(),
            performance_metrics: self.performance_metrics.clone(),
            top_corrections_by_type: top,
            recommended_actions: self.recommended_actions(),
        }
    }

    fn recommended_actions(&self) -> Vec<String> {
        if self.total_corrections == 0 {
            return vec!["No corrections recorded yet; keep collecting feedback".to_string()];
        }

        let mut actions = Vec::new();

        let mut established: Vec<&LearningPattern> = self
            .active_patterns
            .iter()
            .filter(|p| p.confidence_level >= ConfidenceLevel::High)
            .collect();
        established.sort_by(|a, b| {
            b.frequency_count
                .cmp(&a.frequency_count)
                .then_with(|| a.field_name.cmp(&b.field_name))
        });
        for pattern in established {
            actions.push(format!(
                "Review extraction rules for '{}': {} {} corrections ({} confidence)",
                pattern.field_name, pattern.frequency_count, pattern.pattern_type, pattern.confidence_level
            ));
        }

        for (field, adjustment) in &self.confidence_adjustments {
            if *adjustment >= HIGH_ADJUSTMENT {
                actions.push(format!(
                    "Route '{field}' to manual review: learned confidence penalty {adjustment:.2}"
                ));
            }
        }

        let effectiveness = self.performance_metrics.learning_effectiveness;
        if effectiveness > 0.0 && effectiveness < LOW_EFFECTIVENESS {
            actions.push(format!(
                "Learning effectiveness is {:.0}%; audit pattern outcomes",
                effectiveness * 100.0
            ));
        }

        actions
    }
}

/// Health counters for the learning loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Mean success rate of active patterns with recorded success.
    pub learning_effectiveness: f64,
    /// Accepted corrections per type.
    pub corrections_by_type: BTreeMap<CorrectionType, u64>,
    /// Running mean of learning weights.
    pub average_learning_weight: f64,

    /// End of the last maintenance cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_maintenance_at: Option<DateTime<Utc>>,
}

/// Count of corrections of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    /// Correction type.
    pub correction_type: CorrectionType,
    /// Corrections of that type.
    pub count: u64,
}

/// Summary handed to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsights {
    /// Accepted corrections since the last reset.
    pub total_corrections: u64,
    /// Number of active patterns.
    pub active_patterns: usize,
    /// Health counters.
    pub performance_metrics: PerformanceMetrics,
    /// Most frequent correction types, largest first.
    pub top_corrections_by_type: Vec<TypeCount>,
    /// Suggested follow-ups for operators.
    pub recommended_actions: Vec<String>,
}

/// Contents of `learning_state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    /// Stored corrections, oldest first.
    pub corrections: Vec<Correction>,
    /// Aggregated model.
    pub learning_model: LearningModel,

    /// Every tracked pattern, including ones a sweep deactivated.
    #[serde(default)]
    pub patterns: Vec<LearningPattern>,

    /// When the content was last changed and saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<DateTime<Utc>>,
}

/// Mean success rate over active patterns that have any success.
#[must_use]
pub fn learning_effectiveness(patterns: &[LearningPattern]) -> f64 {
    let rates: Vec<f64> = patterns
        .iter()
        .filter(|p| p.is_active && p.success_rate > 0.0)
        .map(|p| p.success_rate)
        .collect();
    if rates.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = rates.len() as f64;
    rates.iter().sum::<f64>() / n
}
