//! The correction engine.
//!
//! Accepts human corrections, folds them into the learning model and the
//! pattern detector, and persists everything to `learning_state.json`.
//! Lock order is engine state, then detector.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::correction::{generate_id, learning_weight, Correction};
use super::maintenance::MaintenanceWorker;
use super::model::{learning_effectiveness, LearningInsights, LearningModel, LearningState};
use super::pattern::{LearningPattern, PatternDetector, PatternId, SweepReport};
use crate::bias::ConfidenceBias;
use crate::config::CorrectionEngineConfig;
use crate::error::{AdjudicatorResult, ResolutionError, StorageError};
use crate::storage::{self, read_json_if_exists, write_json_atomic};

/// What one maintenance cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// What the pattern sweep changed.
    pub sweep: SweepReport,
    /// Corrections dropped by eviction.
    pub evicted: usize,
    /// Active patterns after the cycle.
    pub active_patterns: usize,

    /// False if the state could not be written (the failure is logged).
    pub persisted: bool,
}

struct EngineState {
    corrections: Vec<Correction>,
    model: LearningModel,
    last_saved: Option<DateTime<Utc>>,
    dirty: bool,
}

impl EngineState {
    /// Drops the oldest corrections beyond `max`, keeping survivors in
    /// timestamp order.
    fn evict(&mut self, max: usize) -> usize {
        if self.corrections.len() <= max {
            return 0;
        }
        self.corrections.sort_by_key(|c| c.timestamp);
        let excess = self.corrections.len() - max;
        self.corrections.drain(..excess);
        self.dirty = true;
        excess
    }
}

pub(crate) struct EngineInner {
    config: CorrectionEngineConfig,
    state: RwLock<EngineState>,
    detector: PatternDetector,
}

impl EngineInner {
    fn read_state(&self) -> Result<RwLockReadGuard<'_, EngineState>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned("correction engine state"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, EngineState>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned("correction engine state"))
    }

    fn read_state_lossy(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn run_maintenance(&self) -> AdjudicatorResult<MaintenanceReport> {
        let mut state = self.write_state()?;
        let now = Utc::now();

        let sweep = self.detector.sweep_at(now, self.config.pattern_stale_after());
        let active = self.detector.active_patterns();
        let evicted = state.evict(self.config.max_correction_history);

        let model = &mut state.model;
        model.performance_metrics.learning_effectiveness = learning_effectiveness(&active);
        model.performance_metrics.last_maintenance_at = Some(now);
        model.active_patterns = active;
        state.dirty = true;

        let persisted = match self.persist_locked(&mut state) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist learning state");
                false
            }
        };

        let report = MaintenanceReport {
            sweep,
            evicted,
            active_patterns: state.model.active_patterns.len(),
            persisted,
        };
        info!(
            deactivated = report.sweep.deactivated,
            removed = report.sweep.removed,
            evicted = report.evicted,
            active_patterns = report.active_patterns,
            "learning maintenance cycle"
        );
        Ok(report)
    }

    pub(crate) fn persist(&self) -> AdjudicatorResult<()> {
        let mut state = self.write_state()?;
        self.persist_locked(&mut state)
    }

    fn persist_locked(&self, state: &mut EngineState) -> AdjudicatorResult<()> {
        let Some(dir) = self.config.state_dir.as_deref() else {
            return Ok(());
        };
        if state.dirty {
            state.model.active_patterns = self.detector.active_patterns();
            state.last_saved = Some(Utc::now());
        }

        let document = LearningState {
            corrections: state.corrections.clone(),
            learning_model: state.model.clone(),
            patterns: self.detector.patterns(),
            last_saved: state.last_saved,
        };
        write_json_atomic(&dir.join(storage::LEARNING_STATE_FILE), &document)?;
        state.dirty = false;

        debug!(
            dir = %dir.display(),
            corrections = document.corrections.len(),
            "persisted learning state"
        );
        Ok(())
    }
}

/// Learns from human corrections.
///
/// Share it behind an `Arc` to also use it as the resolver's
/// [`ConfidenceBias`].
pub struct CorrectionEngine {
    inner: Arc<EngineInner>,
    maintenance: Mutex<Option<MaintenanceWorker>>,
}

impl CorrectionEngine {
    /// Creates an engine with empty state. Nothing is loaded from
    /// `state_dir`; use [`CorrectionEngine::open`] for that.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration is out of range.
    pub fn new(config: CorrectionEngineConfig) -> AdjudicatorResult<Self> {
        let config = config.validate()?;
        let state = EngineState {
            corrections: Vec::new(),
            model: LearningModel::default(),
            last_saved: None,
            dirty: false,
        };
        Ok(Self::from_parts(config, state, PatternDetector::new()))
    }

    /// Creates an engine and loads `learning_state.json` from `state_dir`.
    ///
    /// A corrupt state file is logged and the engine starts empty.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration, `StorageError::Io` if an
    /// existing file cannot be read.
    pub fn open(config: CorrectionEngineConfig) -> AdjudicatorResult<Self> {
        let config = config.validate()?;
        let Some(dir) = config.state_dir.clone() else {
            return Self::new(config);
        };

        storage::remove_stale_temp_files(&dir);
        let loaded = load_state(&dir.join(storage::LEARNING_STATE_FILE))?;
        let (state, detector) = match loaded {
            Some(document) => {
                info!(
                    dir = %dir.display(),
                    corrections = document.corrections.len(),
                    patterns = document.patterns.len(),
                    "loaded learning state"
                );
                // Files written before the full pattern map was saved only
                // carry the active view.
                let detector = if document.patterns.is_empty() {
                    PatternDetector::from_patterns(document.learning_model.active_patterns.clone())
                } else {
                    PatternDetector::from_patterns(document.patterns)
                };
                let state = EngineState {
                    corrections: document.corrections,
                    model: document.learning_model,
                    last_saved: document.last_saved,
                    dirty: false,
                };
                (state, detector)
            }
            None => (
                EngineState {
                    corrections: Vec::new(),
                    model: LearningModel::default(),
                    last_saved: None,
                    dirty: false,
                },
                PatternDetector::new(),
            ),
        };
        Ok(Self::from_parts(config, state, detector))
    }

    fn from_parts(config: CorrectionEngineConfig, state: EngineState, detector: PatternDetector) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                state: RwLock::new(state),
                detector,
            }),
            maintenance: Mutex::new(None),
        }
    }

    /// Validates and stores a correction, returning it with its id and
    /// learning weight filled in.
    ///
    /// # Errors
    ///
    /// `InvalidCorrection` for missing required fields; nothing is stored.
    pub fn submit_correction(&self, mut correction: Correction) -> AdjudicatorResult<Correction> {
        correction.validate()?;

        let config = &self.inner.config;
        correction.learning_weight = learning_weight(
            correction.correction_type,
            correction.original_confidence,
            config.min_learning_weight,
        );
        if correction.id.trim().is_empty() {
            correction.id = generate_id(&correction);
        }

        let mut state = self.inner.write_state()?;
        state.model.absorb(&correction, config.adjustment_factor);
        let pattern = self.inner.detector.observe(&correction);
        let at = state
            .corrections
            .partition_point(|c| c.timestamp <= correction.timestamp);
        state.corrections.insert(at, correction.clone());
        state.evict(config.max_correction_history);
        state.dirty = true;
        drop(state);

        debug!(
            id = %correction.id,
            deal = %correction.deal_id,
            field = %correction.field_name,
            correction_type = %correction.correction_type,
            weight = correction.learning_weight,
            pattern = %pattern.id,
            "correction accepted"
        );
        Ok(correction)
    }

    /// Stored corrections for a deal, oldest first.
    #[must_use]
    pub fn corrections_for_deal(&self, deal_id: &str) -> Vec<Correction> {
        self.inner
            .read_state_lossy()
            .corrections
            .iter()
            .filter(|c| c.deal_id == deal_id)
            .cloned()
            .collect()
    }

    /// Looks up a stored correction by id.
    #[must_use]
    pub fn correction(&self, id: &str) -> Option<Correction> {
        self.inner
            .read_state_lossy()
            .corrections
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Number of stored corrections.
    #[must_use]
    pub fn correction_count(&self) -> usize {
        self.inner.read_state_lossy().corrections.len()
    }

    /// Records whether acting on a pattern was right. This is the only
    /// way a pattern's success rate changes.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` for an unknown pattern.
    pub fn record_pattern_outcome(&self, pattern_id: PatternId, success: bool) -> AdjudicatorResult<LearningPattern> {
        let mut state = self.inner.write_state()?;
        let pattern = self
            .inner
            .detector
            .record_outcome(pattern_id, success)
            .ok_or_else(|| ResolutionError::RecordNotFound {
                id: pattern_id.to_string(),
            })?;
        state.dirty = true;
        Ok(pattern)
    }

    /// Current state of one pattern.
    #[must_use]
    pub fn pattern(&self, pattern_id: PatternId) -> Option<LearningPattern> {
        self.inner.detector.pattern(pattern_id)
    }

    /// Snapshot of the model with the current active patterns.
    #[must_use]
    pub fn learning_model(&self) -> LearningModel {
        let state = self.inner.read_state_lossy();
        let mut model = state.model.clone();
        model.active_patterns = self.inner.detector.active_patterns();
        model
    }

    /// Insights derived from the current model.
    #[must_use]
    pub fn learning_insights(&self) -> LearningInsights {
        self.learning_model().insights()
    }

    /// Clears the model, its counters and every pattern. Stored
    /// corrections are kept.
    ///
    /// # Errors
    ///
    /// `LockPoisoned` if a previous holder panicked.
    pub fn reset_learning(&self) -> AdjudicatorResult<()> {
        let mut state = self.inner.write_state()?;
        state.model = LearningModel::default();
        self.inner.detector.clear();
        state.dirty = true;
        info!("learning model reset");
        Ok(())
    }

    /// Runs one maintenance cycle now: sweep patterns, recompute
    /// effectiveness, evict, persist.
    ///
    /// # Errors
    ///
    /// `LockPoisoned` only; persistence failures are logged and reported
    /// in the returned `MaintenanceReport`.
    pub fn run_maintenance(&self) -> AdjudicatorResult<MaintenanceReport> {
        self.inner.run_maintenance()
    }

    /// Writes `learning_state.json` now. A no-op without a `state_dir`.
    ///
    /// # Errors
    ///
    /// Directory creation, serialization or write failure.
    pub fn persist(&self) -> AdjudicatorResult<()> {
        self.inner.persist()
    }

    /// Starts the periodic maintenance worker. Calling it again while the
    /// worker runs does nothing.
    ///
    /// # Errors
    ///
    /// `WorkerSpawn` if the thread cannot be created.
    pub fn start_maintenance(&self) -> AdjudicatorResult<()> {
        let mut guard = self
            .maintenance
            .lock()
            .map_err(|_| StorageError::LockPoisoned("maintenance worker"))?;
        if guard.is_none() {
            let interval = self.inner.config.maintenance_interval();
            let worker = MaintenanceWorker::spawn(Arc::clone(&self.inner), interval)
                .map_err(StorageError::WorkerSpawn)?;
            *guard = Some(worker);
            info!(interval_secs = interval.as_secs(), "learning maintenance started");
        }
        Ok(())
    }

    /// True while the maintenance worker runs.
    #[must_use]
    pub fn maintenance_running(&self) -> bool {
        self.maintenance
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Stops the maintenance worker (letting a cycle in progress finish)
    /// and persists a final time.
    ///
    /// # Errors
    ///
    /// The final persist failed.
    pub fn shutdown(&self) -> AdjudicatorResult<()> {
        self.stop_worker();
        self.inner.persist()
    }

    fn stop_worker(&self) {
        let worker = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop();
            info!("learning maintenance stopped");
        }
    }
}

impl ConfidenceBias for CorrectionEngine {
    fn name(&self) -> &str {
        "correction_engine"
    }

    fn adjustment(&self, field_name: &str) -> Option<f64> {
        self.inner
            .read_state_lossy()
            .model
            .confidence_adjustments
            .get(field_name)
            .copied()
    }
}

impl Drop for CorrectionEngine {
    fn drop(&mut self) {
        self.stop_worker();
        if let Err(e) = self.inner.persist() {
            warn!(error = %e, "failed to persist learning state on drop");
        }
    }
}

impl std::fmt::Debug for CorrectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionEngine")
            .field("config", &self.inner.config)
            .field("maintenance_running", &self.maintenance_running())
            .finish_non_exhaustive()
    }
}

fn load_state(path: &Path) -> AdjudicatorResult<Option<LearningState>> {
    match read_json_if_exists(path) {
        Ok(document) => Ok(document),
        Err(StorageError::Serialization(e)) => {
            warn!(path = %path.display(), error = %e, "corrupt learning state ignored");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
