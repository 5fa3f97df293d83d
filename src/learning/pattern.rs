//! Recurring correction patterns.
//!
//! Corrections are grouped by `(correction type, field name)`. Each group
//! is a `LearningPattern` whose confidence level escalates with frequency.
//! The detector guards its own map; callers holding the engine lock may
//! take it, never the reverse.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::correction::{Correction, CorrectionType};

/// Success rate assigned to a pattern with no recorded outcomes.
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Patterns below this success rate are candidates for removal.
pub const MIN_SUCCESS_RATE: f64 = 0.1;

/// Minimum frequency before a failing pattern is removed.
pub const REMOVAL_MIN_FREQUENCY: u64 = 10;

/// Deterministic identifier for a `(type, field)` pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(Uuid);

impl PatternId {
    /// Derives the id for a pattern key. The same key always maps to the
    /// same id, across restarts.
    #[must_use]
    pub fn for_key(correction_type: CorrectionType, field_name: &str) -> Self {
        let name = format!("{}:{field_name}", correction_type.key());
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How firmly a pattern is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfidenceLevel {
    /// Seen once or twice.
    Low,
    /// Seen 3 or 4 times.
    Medium,
    /// Seen 5 to 9 times.
    High,
    /// Seen 10 or more times.
    VeryHigh,
}

impl ConfidenceLevel {
    /// Level implied by an observation count.
    #[must_use]
    pub const fn for_frequency(frequency: u64) -> Self {
        match frequency {
            10.. => Self::VeryHigh,
            5..=9 => Self::High,
            3 | 4 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::VeryHigh => write!(f, "veryHigh"),
        }
    }
}

/// A recurring kind of correction on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPattern {
    /// Stable id derived from type and field.
    pub id: PatternId,
    /// Correction type the pattern tracks.
    pub pattern_type: CorrectionType,
    /// Field the pattern tracks.
    pub field_name: String,

    /// Most recent value that was corrected.
    pub original_pattern: Value,

    /// Most recent value it was corrected to.
    pub corrected_pattern: Value,
    /// Escalates with frequency, never drops.
    pub confidence_level: ConfidenceLevel,
    /// Corrections observed.
    pub frequency_count: u64,
    /// First observation.
    pub first_seen: DateTime<Utc>,
    /// Latest observation.
    pub last_seen: DateTime<Utc>,
    /// Share of successful outcomes; 0.5 until one is recorded.
    pub success_rate: f64,

    /// Outcomes recorded.
    #[serde(default)]
    pub outcome_count: u64,
    /// Outcomes that were successful.
    #[serde(default)]
    pub success_count: u64,
    /// False once a sweep finds it stale.
    pub is_active: bool,
}

impl LearningPattern {
    fn first(correction: &Correction) -> Self {
        Self {
            id: PatternId::for_key(correction.correction_type, &correction.field_name),
            pattern_type: correction.correction_type,
            field_name: correction.field_name.clone(),
            original_pattern: correction.original_value.clone(),
            corrected_pattern: correction.corrected_value.clone(),
            confidence_level: ConfidenceLevel::Low,
            frequency_count: 1,
            first_seen: correction.timestamp,
            last_seen: correction.timestamp,
            success_rate: NEUTRAL_SUCCESS_RATE,
            outcome_count: 0,
            success_count: 0,
            is_active: true,
        }
    }

    fn repeat(&mut self, correction: &Correction) {
        self.frequency_count += 1;
        self.last_seen = self.last_seen.max(correction.timestamp);
        self.original_pattern = correction.original_value.clone();
        self.corrected_pattern = correction.corrected_value.clone();
        self.confidence_level = self
            .confidence_level
            .max(ConfidenceLevel::for_frequency(self.frequency_count));
        self.is_active = true;
    }

    fn record_outcome(&mut self, success: bool) {
        self.outcome_count += 1;
        if success {
            self.success_count += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.success_count as f64 / self.outcome_count as f64;
        self.success_rate = rate;
    }

    fn is_failing(&self) -> bool {
        self.success_rate < MIN_SUCCESS_RATE && self.frequency_count > REMOVAL_MIN_FREQUENCY
    }
}

/// What a sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Patterns marked inactive.
    pub deactivated: usize,
    /// Failing patterns deleted.
    pub removed: usize,
}

/// Tracks patterns across corrections.
#[derive(Debug, Default)]
pub struct PatternDetector {
    patterns: RwLock<BTreeMap<PatternId, LearningPattern>>,
}

impl PatternDetector {
    /// Creates an empty detector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a detector from persisted patterns.
    #[must_use]
    pub fn from_patterns(patterns: impl IntoIterator<Item = LearningPattern>) -> Self {
        Self {
            patterns: RwLock::new(patterns.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    /// Folds a correction into its pattern and returns the updated pattern.
    ///
    /// Never fails: a poisoned lock is recovered, since every update leaves
    /// the map consistent.
    pub fn observe(&self, correction: &Correction) -> LearningPattern {
        let id = PatternId::for_key(correction.correction_type, &correction.field_name);
        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);

        let pattern = patterns
            .entry(id)
            .and_modify(|p| p.repeat(correction))
            .or_insert_with(|| LearningPattern::first(correction));

        debug!(
            pattern = %id,
            field = %pattern.field_name,
            frequency = pattern.frequency_count,
            level = %pattern.confidence_level,
            "pattern observed"
        );
        pattern.clone()
    }

    /// Sweeps with the default 30 day staleness window.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now(), Duration::days(30))
    }

    /// Deactivates patterns not seen within `stale_after` of `now` and
    /// removes established patterns that keep failing.
    pub fn sweep_at(&self, now: DateTime<Utc>, stale_after: Duration) -> SweepReport {
        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        let mut report = SweepReport::default();

        let before = patterns.len();
        patterns.retain(|_, p| !p.is_failing());
        report.removed = before - patterns.len();

        let cutoff = now - stale_after;
        for pattern in patterns.values_mut() {
            if pattern.is_active && pattern.last_seen < cutoff {
                pattern.is_active = false;
                report.deactivated += 1;
            }
        }
        report
    }

    /// Records whether acting on a pattern turned out right.
    ///
    /// Returns the updated pattern, or `None` for an unknown id.
    pub fn record_outcome(&self, id: PatternId, success: bool) -> Option<LearningPattern> {
        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        let pattern = patterns.get_mut(&id)?;
        pattern.record_outcome(success);
        Some(pattern.clone())
    }

    /// Current state of one pattern.
    #[must_use]
    pub fn pattern(&self, id: PatternId) -> Option<LearningPattern> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Active patterns, ordered by id.
    #[must_use]
    pub fn active_patterns(&self) -> Vec<LearningPattern> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect()
    }

    /// Every tracked pattern, active or not, ordered by id.
    #[must_use]
    pub fn patterns(&self) -> Vec<LearningPattern> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of tracked patterns, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no pattern is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every pattern.
    pub fn clear(&self) {
        self.patterns.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
