//! Candidate values and the conflict context submitted for resolution.
//!
//! A `CandidateValue` is one extraction pass's proposal for a field. A
//! `ConflictContext` groups the competing proposals for a single field of a
//! single document template.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Source/method tag used when the pipeline did not provide one.
pub const UNKNOWN_TAG: &str = "unknown";

/// One proposed value for a field, with its confidence and provenance.
///
/// # Examples
///
/// ```
/// use adjudicator::CandidateValue;
/// use serde_json::json;
///
/// let candidate = CandidateValue::new(json!("125000"), 0.9)
///     .unwrap()
///     .with_source("loan_agreement.pdf")
///     .with_method("manual_entry");
/// assert_eq!(candidate.method, "manual_entry");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateValue {
    /// The proposed value.
    pub value: Value,

    /// Confidence in [0.0, 1.0].
    pub confidence: f64,

    /// Where the value came from (document, service, pass name).
    pub source: String,

    /// Extraction method (`ocr_standard`, `manual_entry`, ...).
    pub method: String,

    /// When the value was produced.
    pub observed_at: DateTime<Utc>,
}

impl CandidateValue {
    /// Creates a candidate observed now with unknown provenance.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if `confidence` is
    /// not in [0.0, 1.0].
    pub fn new(value: Value, confidence: f64) -> Result<Self, ValidationError> {
        validate_confidence(confidence)?;
        Ok(Self {
            value,
            confidence,
            source: UNKNOWN_TAG.to_string(),
            method: UNKNOWN_TAG.to_string(),
            observed_at: Utc::now(),
        })
    }

    /// Sets the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the extraction method tag.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the observation timestamp.
    #[must_use]
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

pub(crate) fn validate_confidence(value: f64) -> Result<(), ValidationError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::ConfidenceOutOfRange { value });
    }
    Ok(())
}

/// The unit of work submitted to the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictContext {
    /// Deal the document belongs to.
    pub deal_id: String,
    /// Template path of the extracted field.
    pub template_path: String,
    /// Name of the field in conflict.
    pub field_name: String,

    /// Declared field type (`number`, `date`, `text`, ...). Drives the
    /// type-specific strategy override.
    #[serde(default)]
    pub field_type: String,

    /// Competing values; must not be empty.
    pub candidates: Vec<CandidateValue>,

    /// Value the field held before this resolution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_value: Option<Value>,

    /// Caller-requested review; forces the manual review strategy.
    #[serde(default)]
    pub requires_review: bool,

    /// Free-form caller data, carried into diagnostics untouched.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ConflictContext {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ConflictContextBuilder {
        ConflictContextBuilder::default()
    }

    /// The `deal:template:field` key under which history is kept.
    #[must_use]
    pub fn history_key(&self) -> String {
        history_key(&self.deal_id, &self.template_path, &self.field_name)
    }

    /// Highest candidate confidence, or `None` for an empty set.
    #[must_use]
    pub fn max_confidence(&self) -> Option<f64> {
        self.candidates
            .iter()
            .map(|c| c.confidence)
            .fold(None, |acc, c| Some(acc.map_or(c, |m: f64| m.max(c))))
    }

    /// Checks candidate presence and confidence ranges.
    ///
    /// # Errors
    ///
    /// `EmptyCandidateSet` for no candidates, `ConfidenceOutOfRange` for a
    /// candidate outside [0.0, 1.0].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.candidates.is_empty() {
            return Err(ValidationError::EmptyCandidateSet);
        }
        for candidate in &self.candidates {
            validate_confidence(candidate.confidence)?;
        }
        Ok(())
    }
}

/// Builds the history key for a field.
#[must_use]
pub fn history_key(deal_id: &str, template_path: &str, field_name: &str) -> String {
    format!("{deal_id}:{template_path}:{field_name}")
}

/// Builder for [`ConflictContext`].
///
/// # Example
/// ```rust,ignore
/// let ctx = ConflictContext::builder()
///     .deal("deal-42")
///     .template("loan/summary.docx")
///     .field("loan_amount", "currency")
///     .candidate(CandidateValue::new(json!("125000"), 0.9)?)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConflictContextBuilder {
    deal_id: Option<String>,
    template_path: Option<String>,
    field_name: Option<String>,
    field_type: String,
    candidates: Vec<CandidateValue>,
    prior_value: Option<Value>,
    requires_review: bool,
    metadata: BTreeMap<String, Value>,
}

impl ConflictContextBuilder {
    /// Sets the deal id (required).
    #[must_use]
    pub fn deal(mut self, deal_id: impl Into<String>) -> Self {
        self.deal_id = Some(deal_id.into());
        self
    }

    /// Sets the template path.
    #[must_use]
    pub fn template(mut self, template_path: impl Into<String>) -> Self {
        self.template_path = Some(template_path.into());
        self
    }

    /// Sets the field name (required) and declared type.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self.field_type = field_type.into();
        self
    }

    /// Adds one candidate.
    #[must_use]
    pub fn candidate(mut self, candidate: CandidateValue) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Adds several candidates, preserving order.
    #[must_use]
    pub fn candidates(mut self, candidates: impl IntoIterator<Item = CandidateValue>) -> Self {
        self.candidates.extend(candidates);
        self
    }

    /// Sets the previous value of the field.
    #[must_use]
    pub fn prior_value(mut self, value: Value) -> Self {
        self.prior_value = Some(value);
        self
    }

    /// Requests manual review regardless of confidence.
    #[must_use]
    pub fn require_review(mut self) -> Self {
        self.requires_review = true;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the context.
    ///
    /// The candidate list may be empty here; the resolver rejects it.
    ///
    /// # Errors
    ///
    /// `MissingField` if the deal id or field name is absent or blank.
    pub fn build(self) -> Result<ConflictContext, ValidationError> {
        let deal_id = require(self.deal_id, "deal_id")?;
        let field_name = require(self.field_name, "field_name")?;
        Ok(ConflictContext {
            deal_id,
            template_path: self.template_path.unwrap_or_default(),
            field_name,
            field_type: self.field_type,
            candidates: self.candidates,
            prior_value: self.prior_value,
            requires_review: self.requires_review,
            metadata: self.metadata,
        })
    }
}

fn require(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField {
            field: field.to_string(),
        }),
    }
}
