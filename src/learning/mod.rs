//! Learning from human corrections.
//!
//! - [`Correction`]: a human fix of an extracted value.
//! - [`PatternDetector`]: groups corrections into escalating patterns.
//! - [`CorrectionEngine`]: validates, weighs and stores corrections,
//!   maintains the [`LearningModel`], and runs periodic maintenance.

mod correction;
mod engine;
mod maintenance;
mod model;
mod pattern;

pub use correction::{generate_id, learning_weight, Correction, CorrectionType};
pub use engine::{CorrectionEngine, MaintenanceReport};
pub use model::{
    learning_effectiveness, LearningInsights, LearningModel, LearningState, PerformanceMetrics, TypeCount,
    MODEL_VERSION,
};
pub use pattern::{
    ConfidenceLevel, LearningPattern, PatternDetector, PatternId, SweepReport, MIN_SUCCESS_RATE,
    NEUTRAL_SUCCESS_RATE, REMOVAL_MIN_FREQUENCY,
};
