//! Human corrections.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::validate_confidence;
use crate::error::ValidationError;

/// Hex characters kept from the hash when an id is generated.
const GENERATED_ID_LEN: usize = 16;

/// What kind of mistake a correction fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorrectionType {
    /// The extracted value was wrong.
    FieldValue,
    /// The value was mapped to the wrong field.
    FieldMapping,
    /// The wrong template was applied.
    Template,
    /// A derived value's formula was wrong.
    Formula,
    /// A validation rule misfired.
    Validation,
    /// The document was classified into the wrong category.
    Category,
}

impl CorrectionType {
    /// Every correction type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::FieldValue,
        Self::FieldMapping,
        Self::Template,
        Self::Formula,
        Self::Validation,
        Self::Category,
    ];

    /// Stable key, as serialized.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::FieldValue => "fieldValue",
            Self::FieldMapping => "fieldMapping",
            Self::Template => "template",
            Self::Formula => "formula",
            Self::Validation => "validation",
            Self::Category => "category",
        }
    }

    /// Learning weight before the confidence discount.
    ///
    /// Structural mistakes (templates, formulas, mappings) outweigh single
    /// value fixes.
    #[must_use]
    pub const fn base_weight(self) -> f64 {
        match self {
            Self::FieldValue => 0.8,
            Self::FieldMapping => 1.2,
            Self::Template => 1.5,
            Self::Formula => 1.3,
            Self::Validation => 0.6,
            Self::Category => 1.1,
        }
    }

    /// Category corrections apply to a whole document, not a field.
    #[must_use]
    pub const fn requires_field(self) -> bool {
        !matches!(self, Self::Category)
    }
}

impl fmt::Display for CorrectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A human correction of an extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Empty until submitted; generated if the caller leaves it blank.
    #[serde(default)]
    pub id: String,
    /// Deal the correction applies to.
    pub deal_id: String,
    /// Source document, if known.
    #[serde(default)]
    pub document_id: String,
    /// Template the field was extracted with, if known.
    #[serde(default)]
    pub template_id: String,
    /// Corrected field; may be empty only for category corrections.
    #[serde(default)]
    pub field_name: String,
    /// Value the pipeline produced.
    pub original_value: Value,
    /// Value the reviewer set.
    pub corrected_value: Value,
    /// Kind of correction.
    pub correction_type: CorrectionType,
    /// Reviewer who made it.
    pub user_id: String,
    /// When it was made.
    pub timestamp: DateTime<Utc>,

    /// Confidence the pipeline had in the value being corrected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_confidence: Option<f64>,

    /// Computed on submission.
    #[serde(default)]
    pub learning_weight: f64,

    /// Free-form reviewer context.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl Correction {
    /// Creates a correction stamped now.
    #[must_use]
    pub fn new(
        deal_id: impl Into<String>,
        field_name: impl Into<String>,
        correction_type: CorrectionType,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            deal_id: deal_id.into(),
            document_id: String::new(),
            template_id: String::new(),
            field_name: field_name.into(),
            original_value: Value::Null,
            corrected_value: Value::Null,
            correction_type,
            user_id: user_id.into(),
            timestamp: Utc::now(),
            original_confidence: None,
            learning_weight: 0.0,
            context: BTreeMap::new(),
        }
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the original and corrected values.
    #[must_use]
    pub fn with_values(mut self, original: Value, corrected: Value) -> Self {
        self.original_value = original;
        self.corrected_value = corrected;
        self
    }

    /// Sets the source document.
    #[must_use]
    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = document_id.into();
        self
    }

    /// Sets the template.
    #[must_use]
    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    /// Records the confidence the pipeline had.
    #[must_use]
    pub fn with_original_confidence(mut self, confidence: f64) -> Self {
        self.original_confidence = Some(confidence);
        self
    }

    /// Adds one context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Checks required fields.
    ///
    /// # Errors
    ///
    /// `InvalidCorrection` naming the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deal_id.trim().is_empty() {
            return Err(ValidationError::required("deal_id"));
        }
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::required("user_id"));
        }
        if self.correction_type.requires_field() && self.field_name.trim().is_empty() {
            return Err(ValidationError::required("field_name"));
        }
        if let Some(confidence) = self.original_confidence {
            validate_confidence(confidence).map_err(|_| ValidationError::InvalidCorrection {
                field: "original_confidence".to_string(),
                reason: format!("must be within [0.0, 1.0] (got {confidence})"),
            })?;
        }
        Ok(())
    }
}

/// Weight of a correction in the learning model.
///
/// Confident mistakes teach less than hesitant ones: the base weight is
/// discounted by the original confidence, then floored at `min_weight`.
#[must_use]
pub fn learning_weight(correction_type: CorrectionType, original_confidence: Option<f64>, min_weight: f64) -> f64 {
    let discount = original_confidence.map_or(1.0, |c| 1.0 - c.clamp(0.0, 1.0));
    (correction_type.base_weight() * discount).max(min_weight)
}

/// Derives an id from the correction's identity and timestamp.
#[must_use]
pub fn generate_id(correction: &Correction) -> String {
    let nanos = correction
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| correction.timestamp.timestamp_micros().saturating_mul(1000));
    let material = format!(
        "{}:{}:{}:{}:{nanos}",
        correction.deal_id, correction.template_id, correction.field_name, correction.user_id
    );
    let hash = blake3::hash(material.as_bytes());
    hash.to_hex()[..GENERATED_ID_LEN].to_string()
}
