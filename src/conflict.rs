//! Conflict identity and classification.
//!
//! Before a strategy runs, the candidate set is classified into a
//! `ConflictType` that explains *why* the candidates differ. The resolver
//! uses the verdict to pick a strategy; the history records it.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::CandidateValue;
use crate::value;

/// Unique identifier for one resolution attempt.
///
/// Shared by the `detected`/`resolved` audit entries and the history record
/// the attempt produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Creates a new random conflict ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the candidates for a field differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Zero or one candidate: nothing to resolve.
    None,

    /// Every candidate carries the same value (case-insensitive).
    Duplicate,

    /// Values differ and the confidence spread exceeds the threshold.
    Confidence,

    /// Values differ, confidences are close, all values are numbers.
    Numeric,

    /// Values differ, confidences are close, all values are strings.
    Textual,

    /// Values differ, confidences are close, value types are mixed.
    Mixed,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Confidence => write!(f, "confidence"),
            Self::Numeric => write!(f, "numeric"),
            Self::Textual => write!(f, "textual"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Classifies a candidate set.
///
/// Order of checks: single candidate, identical values, confidence spread,
/// then value types. Identical values therefore never classify as
/// `Confidence`, however far apart their confidences are.
#[must_use]
pub fn classify(candidates: &[CandidateValue], spread_threshold: f64) -> ConflictType {
    let Some((first, rest)) = candidates.split_first() else {
        return ConflictType::None;
    };
    if rest.is_empty() {
        return ConflictType::None;
    }

    if rest.iter().all(|c| value::loosely_equal(&first.value, &c.value)) {
        return ConflictType::Duplicate;
    }

    if confidence_spread(candidates) > spread_threshold {
        return ConflictType::Confidence;
    }

    if candidates.iter().all(|c| value::is_numeric(&c.value)) {
        ConflictType::Numeric
    } else if candidates.iter().all(|c| value::is_text(&c.value)) {
        ConflictType::Textual
    } else {
        ConflictType::Mixed
    }
}

/// Difference between the highest and lowest confidence (0 when empty).
#[must_use]
pub fn confidence_spread(candidates: &[CandidateValue]) -> f64 {
    let mut iter = candidates.iter().map(|c| c.confidence);
    let Some(first) = iter.next() else {
        return 0.0;
    };
    let (min, max) = iter.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c)));
    max - min
}
