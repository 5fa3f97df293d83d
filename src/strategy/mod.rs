//! Resolution strategies.
//!
//! The strategy set is closed: each `StrategyKind` variant carries its
//! descriptor (key, display name, priority, applicable field types) and one
//! pure `resolve` operation. Strategies never touch resolver state, so the
//! same context and parameters always yield the same outcome.

mod policies;
mod source_priority;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::ConflictContext;
use crate::error::{AdjudicatorResult, ValidationError};

pub use source_priority::{method_priority, UNKNOWN_METHOD_PRIORITY};

/// Marker in `applicable_field_types` for "any field type".
pub const ANY_FIELD_TYPE: &str = "*";

/// The closed set of resolution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Pick the candidate with the highest confidence.
    HighestConfidence,

    /// Confidence-weighted mean of every numeric candidate.
    NumericAveraging,

    /// Pick the most recently observed candidate.
    LatestValue,

    /// Placeholder value, zero confidence, always flagged for review.
    ManualReview,

    /// Rank candidates by extraction method priority and confidence.
    SourcePriority,
}

impl StrategyKind {
    /// Every strategy, in registry order.
    pub const ALL: [Self; 5] = [
        Self::HighestConfidence,
        Self::NumericAveraging,
        Self::LatestValue,
        Self::ManualReview,
        Self::SourcePriority,
    ];

    /// Stable key used in configuration, history and audit records.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::HighestConfidence => "highest_confidence",
            Self::NumericAveraging => "numeric_averaging",
            Self::LatestValue => "latest_value",
            Self::ManualReview => "manual_review",
            Self::SourcePriority => "source_priority",
        }
    }

    /// Looks a strategy up by key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key.trim())
    }

    /// Name shown in strategy listings.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::HighestConfidence => "Highest Confidence",
            Self::NumericAveraging => "Numeric Averaging",
            Self::LatestValue => "Latest Value",
            Self::ManualReview => "Manual Review",
            Self::SourcePriority => "Source Priority",
        }
    }

    /// Ordering hint for listings; lower runs earlier in the registry.
    #[must_use]
    pub const fn priority(self) -> u32 {
        match self {
            Self::HighestConfidence => 1,
            Self::NumericAveraging => 2,
            Self::LatestValue => 3,
            Self::SourcePriority => 4,
            Self::ManualReview => 10,
        }
    }

    /// Confidence margin below which a win is reported as narrow.
    #[must_use]
    pub const fn min_confidence_diff(self) -> f64 {
        match self {
            Self::HighestConfidence | Self::SourcePriority => 0.1,
            Self::NumericAveraging => 0.05,
            Self::LatestValue | Self::ManualReview => 0.0,
        }
    }

    /// Field types the strategy is meant for; `*` means any.
    #[must_use]
    pub const fn applicable_field_types(self) -> &'static [&'static str] {
        match self {
            Self::HighestConfidence | Self::ManualReview | Self::SourcePriority => &[ANY_FIELD_TYPE],
            Self::NumericAveraging => &["number", "integer", "currency", "percentage"],
            Self::LatestValue => &["date", "timestamp", "datetime"],
        }
    }

    /// True if the strategy declares itself usable for `field_type`.
    #[must_use]
    pub fn applies_to(self, field_type: &str) -> bool {
        self.applicable_field_types()
            .iter()
            .any(|t| *t == ANY_FIELD_TYPE || t.eq_ignore_ascii_case(field_type))
    }

    /// Serializable description of this strategy.
    #[must_use]
    pub fn descriptor(self) -> StrategyDescriptor {
        StrategyDescriptor {
            key: self.key().to_string(),
            display_name: self.display_name().to_string(),
            priority: self.priority(),
            min_confidence_diff: self.min_confidence_diff(),
            applicable_field_types: self
                .applicable_field_types()
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }

    /// Runs the strategy.
    ///
    /// # Errors
    ///
    /// `EmptyCandidateSet` for a context without candidates. Beyond that
    /// only `NumericAveraging` fails: `NoValidNumericValues` when nothing
    /// parses, `ZeroConfidenceWeight` when the parsed candidates carry no
    /// confidence, `NonFiniteAverage` when the weighted sum overflows.
    pub fn resolve(
        self,
        context: &ConflictContext,
        params: &StrategyParams,
    ) -> AdjudicatorResult<ResolutionOutcome> {
        if context.candidates.is_empty() {
            return Err(ValidationError::EmptyCandidateSet.into());
        }
        match self {
            Self::HighestConfidence => Ok(policies::highest_confidence(context, params)),
            Self::NumericAveraging => Ok(policies::numeric_averaging(context, params)?),
            Self::LatestValue => Ok(policies::latest_value(context, params)),
            Self::ManualReview => Ok(policies::manual_review(context)),
            Self::SourcePriority => Ok(policies::source_priority(context, params)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Thresholds a strategy reads from the resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    /// Winners below this confidence are flagged for review.
    pub review_threshold: f64,

    /// Candidates below this confidence are counted in diagnostics.
    pub min_confidence_threshold: f64,

    /// Adds per-candidate detail to diagnostics.
    pub debug: bool,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            review_threshold: 0.5,
            min_confidence_threshold: 0.3,
            debug: false,
        }
    }
}

/// Listing entry for a registered strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Registry key.
    pub key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Listing order; lower first.
    pub priority: u32,
    /// Margin below which a win is reported as narrow.
    pub min_confidence_diff: f64,
    /// Field types the strategy is meant for.
    pub applicable_field_types: Vec<String>,
}

/// Result of running a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    /// Chosen value.
    pub resolved_value: Value,
    /// Key of the strategy that produced it.
    pub strategy_key: String,

    /// Confidence in the resolved value, in [0.0, 1.0].
    pub final_confidence: f64,
    /// Needs a human decision.
    pub requires_review: bool,
    /// Human-readable explanation.
    pub notes: String,

    /// Structured details for debugging and audit.
    #[serde(default)]
    pub diagnostics: BTreeMap<String, Value>,
}
