//! # adjudicator - confidence-weighted field conflict resolution
//!
//! Document extraction pipelines often produce several candidate values for
//! the same field: OCR, NLP, structured imports and humans all disagree.
//! adjudicator picks one value per field, explains why, remembers the
//! decision, and learns from the corrections people make afterwards.
//!
//! ## Core Concepts
//!
//! - **CandidateValue**: one proposed value with a confidence and provenance
//! - **ConflictContext**: the competing candidates for one field of one deal
//! - **ConflictResolver**: classifies the conflict, runs a strategy, records
//!   history and an audit trail
//! - **CorrectionEngine**: turns human corrections into patterns and
//!   per-field confidence adjustments
//!
//! ## Usage
//!
//! ```rust
//! use adjudicator::{CandidateValue, ConflictContext, ConflictResolutionConfig, ConflictResolver};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), adjudicator::AdjudicatorError> {
//! let resolver = ConflictResolver::new(ConflictResolutionConfig::default())?;
//!
//! let context = ConflictContext::builder()
//!     .deal("deal-17")
//!     .template("loan_agreement")
//!     .field("loan_amount", "number")
//!     .candidate(CandidateValue::new(json!("120000"), 0.6)?.with_method("ocr_standard"))
//!     .candidate(CandidateValue::new(json!("125000"), 0.9)?.with_method("manual_entry"))
//!     .build()?;
//!
//! let outcome = resolver.resolve(&context)?;
//! assert_eq!(outcome.resolved_value, json!("125000"));
//! assert!(!outcome.requires_review);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod candidate;
pub mod conflict;
pub mod error;
pub mod value;

// Resolution
pub mod audit;
pub mod bias;
pub mod config;
pub mod history;
pub mod resolver;
pub mod strategy;

// Learning and persistence
pub mod learning;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use audit::{AuditAction, AuditEntry, AuditId, AuditLog};
pub use bias::{ConfidenceBias, StaticBias};
pub use candidate::{CandidateValue, ConflictContext, ConflictContextBuilder};
pub use config::{ConflictResolutionConfig, CorrectionEngineConfig};
pub use conflict::{classify, ConflictId, ConflictType};
pub use error::{AdjudicatorError, AdjudicatorResult, ResolutionError, StorageError, ValidationError};
pub use history::{ResolutionHistory, ResolutionRecord, ResolutionStatistics};
pub use learning::{
    ConfidenceLevel, Correction, CorrectionEngine, CorrectionType, LearningInsights, LearningModel,
    LearningPattern, PatternDetector, PatternId,
};
pub use resolver::ConflictResolver;
pub use strategy::{ResolutionOutcome, StrategyDescriptor, StrategyKind, StrategyParams};
