//! Configuration for the resolver and the correction engine.
//!
//! Every field has a default, so a partial JSON document is a valid
//! configuration. `validate` is applied on load and on every update.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AdjudicatorResult, StorageError, ValidationError};
use crate::strategy::{StrategyKind, StrategyParams};

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictResolutionConfig {
    /// Candidates below this confidence are reported in diagnostics.
    pub min_confidence_threshold: f64,

    /// Below this, a winner is flagged for review; if *every* candidate is
    /// below it, manual review is forced.
    pub review_threshold: f64,

    /// Confidence spread above which differing values classify as a
    /// confidence conflict.
    pub numeric_averaging_threshold: f64,

    /// Records kept per field key, and the audit trail bound.
    pub max_history_entries: usize,

    /// Minimum time between automatic history saves.
    pub persistence_interval_secs: u64,

    /// Strategies the classifier may dispatch to.
    pub default_strategies: Vec<String>,

    /// Field type → strategy key overrides.
    pub type_specific_strategies: BTreeMap<String, String>,

    /// Record detected/resolved/reviewed/overridden audit entries.
    pub enable_audit_trail: bool,

    /// Adds per-candidate diagnostics and verbose events.
    pub debug_mode: bool,

    /// Directory for `resolution_history.json` and `audit_trail.json`.
    /// `None` keeps everything in memory.
    pub history_dir: Option<PathBuf>,

    /// Lets an attached `ConfidenceBias` lower final confidence for fields
    /// that humans keep correcting.
    pub apply_learned_adjustments: bool,
}

impl Default for ConflictResolutionConfig {
    fn default() -> Self {
        let type_specific_strategies = [
            ("date", StrategyKind::LatestValue),
            ("timestamp", StrategyKind::LatestValue),
        ]
        .into_iter()
        .map(|(field_type, kind)| (field_type.to_string(), kind.key().to_string()))
        .collect();

        Self {
            min_confidence_threshold: 0.3,
            review_threshold: 0.5,
            numeric_averaging_threshold: 0.05,
            max_history_entries: 1000,
            persistence_interval_secs: 300,
            default_strategies: StrategyKind::ALL.iter().map(|k| k.key().to_string()).collect(),
            type_specific_strategies,
            enable_audit_trail: true,
            debug_mode: false,
            history_dir: None,
            apply_learned_adjustments: false,
        }
    }
}

impl ConflictResolutionConfig {
    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Storage errors for unreadable or malformed files, `InvalidConfig`
    /// for out-of-range values.
    pub fn from_json_file(path: impl AsRef<Path>) -> AdjudicatorResult<Self> {
        let cfg: Self = read_json(path.as_ref())?;
        Ok(cfg.validate()?)
    }

    /// Checks ranges.
    ///
    /// Strategy keys are *not* checked: an unknown override falls back to
    /// highest confidence at resolve time.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the offending field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        check_unit("min_confidence_threshold", self.min_confidence_threshold)?;
        check_unit("review_threshold", self.review_threshold)?;
        check_unit("numeric_averaging_threshold", self.numeric_averaging_threshold)?;
        if self.max_history_entries == 0 {
            return Err(ValidationError::config("max_history_entries must be at least 1"));
        }
        Ok(self)
    }

    /// `persistence_interval_secs` as a `Duration`.
    #[must_use]
    pub const fn persistence_interval(&self) -> Duration {
        Duration::from_secs(self.persistence_interval_secs)
    }

    /// True if the classifier may dispatch to `kind`.
    #[must_use]
    pub fn allows(&self, kind: StrategyKind) -> bool {
        self.default_strategies.iter().any(|k| k.trim() == kind.key())
    }

    /// Override configured for a field type, as written (may be unknown).
    #[must_use]
    pub fn override_for(&self, field_type: &str) -> Option<&str> {
        let field_type = field_type.trim();
        if field_type.is_empty() {
            return None;
        }
        self.type_specific_strategies
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(field_type))
            .map(|(_, key)| key.as_str())
    }

    /// Thresholds handed to every strategy.
    #[must_use]
    pub const fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            review_threshold: self.review_threshold,
            min_confidence_threshold: self.min_confidence_threshold,
            debug: self.debug_mode,
        }
    }
}

/// Correction engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionEngineConfig {
    /// Directory for `learning_state.json`. `None` keeps state in memory.
    pub state_dir: Option<PathBuf>,

    /// Stored corrections beyond this are evicted oldest first.
    pub max_correction_history: usize,

    /// Floor for computed learning weights.
    pub min_learning_weight: f64,

    /// Period of the background maintenance task.
    pub maintenance_interval_secs: u64,

    /// Patterns not seen for this long are deactivated.
    pub pattern_stale_after_days: i64,

    /// Scale applied to a learning weight before it is added to the
    /// field's confidence adjustment.
    pub adjustment_factor: f64,
}

impl Default for CorrectionEngineConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            max_correction_history: 1000,
            min_learning_weight: 0.1,
            maintenance_interval_secs: 60,
            pattern_stale_after_days: 30,
            adjustment_factor: 0.1,
        }
    }
}

impl CorrectionEngineConfig {
    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Storage errors for unreadable or malformed files, `InvalidConfig`
    /// for out-of-range values.
    pub fn from_json_file(path: impl AsRef<Path>) -> AdjudicatorResult<Self> {
        let cfg: Self = read_json(path.as_ref())?;
        Ok(cfg.validate()?)
    }

    /// # Errors
    ///
    /// `InvalidConfig` naming the offending field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_correction_history == 0 {
            return Err(ValidationError::config("max_correction_history must be at least 1"));
        }
        if !self.min_learning_weight.is_finite() || self.min_learning_weight < 0.0 {
            return Err(ValidationError::config("min_learning_weight must be a non-negative number"));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(ValidationError::config("maintenance_interval_secs must be at least 1"));
        }
        if self.pattern_stale_after_days <= 0 {
            return Err(ValidationError::config("pattern_stale_after_days must be positive"));
        }
        if !self.adjustment_factor.is_finite() || self.adjustment_factor < 0.0 {
            return Err(ValidationError::config("adjustment_factor must be a non-negative number"));
        }
        Ok(self)
    }

    /// `maintenance_interval_secs` as a `Duration`.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// `pattern_stale_after_days` as a `chrono::Duration`.
    #[must_use]
    pub fn pattern_stale_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.pattern_stale_after_days)
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::config(format!(
            "{field} must be within [0.0, 1.0] (got {value})"
        )));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
