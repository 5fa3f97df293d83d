//! The conflict resolver.
//!
//! `ConflictResolver` owns the resolution history, the audit trail and the
//! active configuration behind a single `RwLock`. A `resolve` call runs
//! classification, strategy selection, the strategy itself and both
//! record appends under one write guard, so concurrent calls never
//! interleave their audit entries.
//!
//! Persistence happens after the guard is released: an elapsed
//! `persistence_interval` triggers a save under a read guard, and failures
//! are logged rather than returned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::bias::{apply_adjustment, ConfidenceBias};
use crate::candidate::{history_key, ConflictContext};
use crate::config::ConflictResolutionConfig;
use crate::conflict::{classify, ConflictId, ConflictType};
use crate::error::{AdjudicatorResult, ResolutionError, StorageError, ValidationError};
use crate::history::{
    ResolutionHistory, ResolutionRecord, ResolutionStatistics, MANUAL_OVERRIDE_KEY, SYSTEM_ACTOR,
};
use crate::storage::{self, read_json_if_exists, write_json_atomic};
use crate::strategy::{ResolutionOutcome, StrategyDescriptor, StrategyKind};

/// Why a strategy was chosen, recorded in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    ReviewRequested,
    BelowReviewThreshold,
    TypeOverride,
    UnknownOverride,
    Classified,
    NotAllowed,
    Fallback,
}

impl Selection {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ReviewRequested => "review_requested",
            Self::BelowReviewThreshold => "below_review_threshold",
            Self::TypeOverride => "type_override",
            Self::UnknownOverride => "unknown_override",
            Self::Classified => "classified",
            Self::NotAllowed => "classified_not_allowed",
            Self::Fallback => "fallback",
        }
    }
}

struct ResolverState {
    config: ConflictResolutionConfig,
    history: ResolutionHistory,
    audit: AuditLog,
    last_saved: Instant,
}

impl ResolverState {
    fn record_audit(&mut self, entry: AuditEntry) {
        if self.config.enable_audit_trail {
            let max = self.config.max_history_entries;
            self.audit.append(entry, max);
        }
    }

    /// Marks a save as taken if one is due, returning the directory to
    /// write into.
    fn take_due_save(&mut self) -> Option<PathBuf> {
        let dir = self.config.history_dir.clone()?;
        if self.last_saved.elapsed() < self.config.persistence_interval() {
            return None;
        }
        self.last_saved = Instant::now();
        Some(dir)
    }
}

/// Resolves conflicting candidate values and keeps their history.
pub struct ConflictResolver {
    state: RwLock<ResolverState>,
    bias: Option<Arc<dyn ConfidenceBias>>,
}

impl ConflictResolver {
    /// Creates an in-memory resolver. Nothing is loaded from
    /// `history_dir`; use [`ConflictResolver::open`] for that.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration is out of range.
    pub fn new(config: ConflictResolutionConfig) -> AdjudicatorResult<Self> {
        let config = config.validate()?;
        Ok(Self::from_parts(config, ResolutionHistory::new(), AuditLog::new()))
    }

    /// Creates a resolver and loads any history and audit trail found in
    /// `history_dir`.
    ///
    /// A corrupt file is logged and replaced by an empty document on the
    /// next save.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration, `StorageError::Io` if an
    /// existing file cannot be read.
    pub fn open(config: ConflictResolutionConfig) -> AdjudicatorResult<Self> {
        let config = config.validate()?;
        let (history, audit) = match config.history_dir.as_deref() {
            Some(dir) => {
                storage::remove_stale_temp_files(dir);
                let history: ResolutionHistory = load_or_default(&dir.join(storage::HISTORY_FILE))?;
                let audit: AuditLog = load_or_default(&dir.join(storage::AUDIT_FILE))?;
                info!(
                    dir = %dir.display(),
                    records = history.total_records(),
                    audit_entries = audit.len(),
                    "loaded resolution history"
                );
                (history, audit)
            }
            None => (ResolutionHistory::new(), AuditLog::new()),
        };
        Ok(Self::from_parts(config, history, audit))
    }

    fn from_parts(config: ConflictResolutionConfig, history: ResolutionHistory, audit: AuditLog) -> Self {
        Self {
            state: RwLock::new(ResolverState {
                config,
                history,
                audit,
                last_saved: Instant::now(),
            }),
            bias: None,
        }
    }

    /// Attaches a source of learned confidence adjustments. Adjustments are
    /// applied only while `apply_learned_adjustments` is enabled.
    #[must_use]
    pub fn with_bias(mut self, bias: Arc<dyn ConfidenceBias>) -> Self {
        self.bias = Some(bias);
        self
    }

    /// Resolves one field.
    ///
    /// # Errors
    ///
    /// - `EmptyCandidateSet` / `ConfidenceOutOfRange` for invalid input
    ///   (nothing is recorded);
    /// - `NoValidNumericValues` / `ZeroConfidenceWeight` /
    ///   `NonFiniteAverage` from numeric averaging (the `detected` audit entry is kept, no record is added);
    /// - `LockPoisoned` if a previous holder panicked.
    pub fn resolve(&self, context: &ConflictContext) -> AdjudicatorResult<ResolutionOutcome> {
        context.validate()?;

        let learned = self.bias.as_ref().and_then(|bias| {
            bias.adjustment(&context.field_name)
                .map(|adjustment| (bias.name().to_string(), adjustment))
        });

        let (outcome, due_save) = {
            let mut state = self.write_state()?;
            let outcome = resolve_locked(&mut state, context, learned)?;
            (outcome, state.take_due_save())
        };

        if let Some(dir) = due_save {
            if let Err(e) = self.persist_to(&dir) {
                warn!(error = %e, dir = %dir.display(), "failed to persist resolution history");
            }
        }
        Ok(outcome)
    }

    /// Records for one field, oldest first.
    #[must_use]
    pub fn conflict_history(&self, deal_id: &str, template_path: &str, field_name: &str) -> Vec<ResolutionRecord> {
        let key = history_key(deal_id, template_path, field_name);
        self.read_state_lossy()
            .history
            .get(&key)
            .map(<[ResolutionRecord]>::to_vec)
            .unwrap_or_default()
    }

    /// Every field history for a deal, keyed `deal:template:field`.
    #[must_use]
    pub fn deal_history(&self, deal_id: &str) -> BTreeMap<String, Vec<ResolutionRecord>> {
        self.read_state_lossy().history.for_deal(deal_id)
    }

    /// Audit entries, optionally restricted to one resolution attempt.
    #[must_use]
    pub fn audit_trail(&self, conflict_id: Option<ConflictId>) -> Vec<AuditEntry> {
        let state = self.read_state_lossy();
        match conflict_id {
            Some(id) => state.audit.for_conflict(id),
            None => state.audit.entries().to_vec(),
        }
    }

    /// Confirms a resolution: clears its review flag and appends a
    /// `reviewed` audit entry.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if no record has this id.
    pub fn mark_reviewed(
        &self,
        record_id: ConflictId,
        actor: &str,
        notes: &str,
    ) -> AdjudicatorResult<ResolutionRecord> {
        let mut state = self.write_state()?;
        let record = state
            .history
            .find_mut(record_id)
            .ok_or_else(|| ResolutionError::RecordNotFound {
                id: record_id.to_string(),
            })?;

        record.requires_review = false;
        if !notes.is_empty() {
            if !record.notes.is_empty() {
                record.notes.push_str("; ");
            }
            record.notes.push_str(notes);
        }
        let reviewed = record.clone();

        let details = if notes.is_empty() {
            format!("Reviewed by {actor}")
        } else {
            format!("Reviewed by {actor}: {notes}")
        };
        state.record_audit(
            AuditEntry::new(record_id, AuditAction::Reviewed, actor, details)
                .with_states(None, Some(reviewed.resolved_value.clone()))
                .with_confidence(reviewed.final_confidence),
        );
        debug!(record = %record_id, actor, "resolution reviewed");
        Ok(reviewed)
    }

    /// Replaces the current value of a field with a human-supplied one.
    ///
    /// The override is appended as a new record (strategy
    /// `manual_override`, confidence 1.0) so the replaced resolution stays
    /// in the history.
    ///
    /// # Errors
    ///
    /// `MissingField` for a blank deal id or field name.
    pub fn override_resolution(
        &self,
        deal_id: &str,
        template_path: &str,
        field_name: &str,
        value: Value,
        actor: &str,
        notes: &str,
    ) -> AdjudicatorResult<ResolutionRecord> {
        if deal_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "deal_id".to_string(),
            }
            .into());
        }
        if field_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "field_name".to_string(),
            }
            .into());
        }

        let mut state = self.write_state()?;
        let key = history_key(deal_id, template_path, field_name);
        let previous = state.history.latest(&key).cloned();

        let record = ResolutionRecord {
            id: ConflictId::new(),
            deal_id: deal_id.to_string(),
            template_path: template_path.to_string(),
            field_name: field_name.to_string(),
            conflict_type: previous.as_ref().map_or(ConflictType::None, |p| p.conflict_type),
            candidates: previous.as_ref().map(|p| p.candidates.clone()).unwrap_or_default(),
            resolved_value: value.clone(),
            strategy_key: MANUAL_OVERRIDE_KEY.to_string(),
            final_confidence: 1.0,
            requires_review: false,
            resolved_at: Utc::now(),
            resolved_by: actor.to_string(),
            notes: notes.to_string(),
        };

        let max = state.config.max_history_entries;
        state.history.append(record.clone(), max);
        state.record_audit(
            AuditEntry::new(
                record.id,
                AuditAction::Overridden,
                actor,
                format!("Override of {key} by {actor}"),
            )
            .with_states(previous.map(|p| p.resolved_value), Some(value))
            .with_confidence(1.0),
        );
        info!(key = %key, actor, "resolution overridden");
        Ok(record)
    }

    /// Aggregates over the stored history.
    #[must_use]
    pub fn statistics(&self) -> ResolutionStatistics {
        self.read_state_lossy().history.statistics()
    }

    /// Registered strategies, ordered by priority.
    #[must_use]
    pub fn strategies(&self) -> Vec<StrategyDescriptor> {
        let mut kinds = StrategyKind::ALL.to_vec();
        kinds.sort_by_key(|k| k.priority());
        kinds.into_iter().map(StrategyKind::descriptor).collect()
    }

    /// Copy of the active configuration.
    #[must_use]
    pub fn configuration(&self) -> ConflictResolutionConfig {
        self.read_state_lossy().config.clone()
    }

    /// Replaces the configuration wholesale.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the new configuration is out of range; the old
    /// one stays active.
    pub fn update_configuration(&self, config: ConflictResolutionConfig) -> AdjudicatorResult<()> {
        let config = config.validate()?;
        let mut state = self.write_state()?;
        state.config = config;
        info!("resolver configuration updated");
        Ok(())
    }

    /// Writes history and audit trail now.
    ///
    /// A no-op without a `history_dir`.
    ///
    /// # Errors
    ///
    /// Directory creation, serialization or write failure.
    pub fn flush(&self) -> AdjudicatorResult<()> {
        let dir = {
            let mut state = self.write_state()?;
            state.last_saved = Instant::now();
            state.config.history_dir.clone()
        };
        match dir {
            Some(dir) => self.persist_to(&dir),
            None => Ok(()),
        }
    }

    fn persist_to(&self, dir: &Path) -> AdjudicatorResult<()> {
        let state = self.read_state()?;
        write_json_atomic(&dir.join(storage::HISTORY_FILE), &state.history)?;
        write_json_atomic(&dir.join(storage::AUDIT_FILE), &state.audit)?;
        info!(
            dir = %dir.display(),
            records = state.history.total_records(),
            audit_entries = state.audit.len(),
            "persisted resolution history"
        );
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, ResolverState>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned("resolver state"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ResolverState>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned("resolver state"))
    }

    fn read_state_lossy(&self) -> RwLockReadGuard<'_, ResolverState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("bias", &self.bias.as_ref().map(|b| b.name().to_string()))
            .finish_non_exhaustive()
    }
}

fn resolve_locked(
    state: &mut ResolverState,
    context: &ConflictContext,
    learned: Option<(String, f64)>,
) -> AdjudicatorResult<ResolutionOutcome> {
    let conflict_id = ConflictId::new();
    let key = context.history_key();
    let conflict_type = classify(&context.candidates, state.config.numeric_averaging_threshold);

    state.record_audit(
        AuditEntry::new(
            conflict_id,
            AuditAction::Detected,
            SYSTEM_ACTOR,
            format!(
                "{} candidates for {key} ({conflict_type} conflict)",
                context.candidates.len()
            ),
        )
        .with_states(context.prior_value.clone(), None),
    );

    let (kind, selection) = select_strategy(&state.config, context, conflict_type);
    debug!(
        key = %key,
        conflict = %conflict_id,
        conflict_type = %conflict_type,
        strategy = %kind,
        selection = selection.as_str(),
        "strategy selected"
    );

    let params = state.config.strategy_params();
    let mut outcome = kind.resolve(context, &params)?;

    if state.config.apply_learned_adjustments && kind != StrategyKind::ManualReview {
        if let Some((source, adjustment)) = learned.filter(|(_, a)| *a > 0.0) {
            let adjusted = apply_adjustment(outcome.final_confidence, adjustment);
            outcome.final_confidence = adjusted;
            outcome.requires_review |= adjusted < params.review_threshold;
            outcome
                .diagnostics
                .insert("learned_adjustment".to_string(), json!(adjustment));
            outcome.diagnostics.insert("bias_source".to_string(), json!(source));
        }
    }
    outcome.final_confidence = outcome.final_confidence.clamp(0.0, 1.0);

    outcome
        .diagnostics
        .insert("conflict_id".to_string(), json!(conflict_id.to_string()));
    outcome
        .diagnostics
        .insert("conflict_type".to_string(), json!(conflict_type));
    outcome
        .diagnostics
        .insert("selection".to_string(), json!(selection.as_str()));
    if let Some(prior) = &context.prior_value {
        outcome.diagnostics.insert(
            "prior_value_changed".to_string(),
            json!(!crate::value::loosely_equal(prior, &outcome.resolved_value)),
        );
    }

    if state.config.debug_mode {
        debug!(
            key = %key,
            diagnostics = ?outcome.diagnostics,
            "resolution diagnostics"
        );
    }

    let record = ResolutionRecord {
        id: conflict_id,
        deal_id: context.deal_id.clone(),
        template_path: context.template_path.clone(),
        field_name: context.field_name.clone(),
        conflict_type,
        candidates: context.candidates.clone(),
        resolved_value: outcome.resolved_value.clone(),
        strategy_key: outcome.strategy_key.clone(),
        final_confidence: outcome.final_confidence,
        requires_review: outcome.requires_review,
        resolved_at: Utc::now(),
        resolved_by: SYSTEM_ACTOR.to_string(),
        notes: outcome.notes.clone(),
    };
    let max = state.config.max_history_entries;
    state.history.append(record, max);

    state.record_audit(
        AuditEntry::new(
            conflict_id,
            AuditAction::Resolved,
            SYSTEM_ACTOR,
            format!("Resolved {key} with {}", outcome.strategy_key),
        )
        .with_states(context.prior_value.clone(), Some(outcome.resolved_value.clone()))
        .with_confidence(outcome.final_confidence),
    );

    Ok(outcome)
}

/// Picks a strategy; the first matching rule wins.
fn select_strategy(
    config: &ConflictResolutionConfig,
    context: &ConflictContext,
    conflict_type: ConflictType,
) -> (StrategyKind, Selection) {
    if context.requires_review {
        return (StrategyKind::ManualReview, Selection::ReviewRequested);
    }
    if context
        .max_confidence()
        .is_some_and(|max| max < config.review_threshold)
    {
        return (StrategyKind::ManualReview, Selection::BelowReviewThreshold);
    }

    if let Some(key) = config.override_for(&context.field_type) {
        return match StrategyKind::from_key(key) {
            Some(kind) => (kind, Selection::TypeOverride),
            None => {
                warn!(
                    field_type = %context.field_type,
                    key,
                    "unknown strategy override, using highest confidence"
                );
                (StrategyKind::HighestConfidence, Selection::UnknownOverride)
            }
        };
    }

    let classified = match conflict_type {
        ConflictType::Numeric => StrategyKind::NumericAveraging,
        ConflictType::Confidence | ConflictType::Duplicate | ConflictType::Textual => {
            StrategyKind::HighestConfidence
        }
        ConflictType::Mixed | ConflictType::None => {
            return (StrategyKind::HighestConfidence, Selection::Fallback);
        }
    };
    if config.allows(classified) {
        (classified, Selection::Classified)
    } else {
        (StrategyKind::HighestConfidence, Selection::NotAllowed)
    }
}

fn load_or_default<T>(path: &Path) -> AdjudicatorResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match read_json_if_exists(path) {
        Ok(document) => Ok(document.unwrap_or_default()),
        Err(StorageError::Serialization(e)) => {
            warn!(path = %path.display(), error = %e, "corrupt state file ignored");
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bias::StaticBias;
    use crate::candidate::CandidateValue;
    use crate::error::AdjudicatorError;

    fn cand(value: Value, confidence: f64, method: &str) -> CandidateValue {
        CandidateValue::new(value, confidence).unwrap().with_method(method)
    }

    fn context(field_type: &str, candidates: Vec<CandidateValue>) -> ConflictContext {
        ConflictContext::builder()
            .deal("deal-1")
            .template("rent_roll")
            .field("loan_amount", field_type)
            .candidates(candidates)
            .build()
            .unwrap()
    }

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(ConflictResolutionConfig::default()).unwrap()
    }

    #[test]
    fn confidence_conflict_picks_highest() {
        let r = resolver();
        let ctx = context(
            "number",
            vec![
                cand(json!("120000"), 0.6, "ocr_standard"),
                cand(json!("125000"), 0.9, "manual_entry"),
                cand(json!("125000"), 0.55, "nlp_extraction"),
            ],
        );
        let out = r.resolve(&ctx).unwrap();
        assert_eq!(out.resolved_value, json!("125000"));
        assert!((out.final_confidence - 0.9).abs() < 1e-12);
        assert!(!out.requires_review);
        assert_eq!(out.strategy_key, "highest_confidence");
        assert_eq!(out.diagnostics["conflict_type"], json!("confidence"));
    }

    #[test]
    fn duplicate_values_resolve_to_top_confidence() {
        let r = resolver();
        let ctx = context("text", vec![cand(json!("100"), 0.5, "ocr"), cand(json!("100"), 0.9, "ocr")]);
        let out = r.resolve(&ctx).unwrap();
        assert_eq!(out.resolved_value, json!("100"));
        assert!((out.final_confidence - 0.9).abs() < 1e-12);
        assert_eq!(out.diagnostics["conflict_type"], json!("duplicate"));
    }

    #[test]
    fn close_numbers_are_averaged() {
        let r = resolver();
        let ctx = context("number", vec![cand(json!(100), 0.8, "ocr"), cand(json!(110), 0.82, "ocr")]);
        let out = r.resolve(&ctx).unwrap();
        assert_eq!(out.strategy_key, "numeric_averaging");
    }

    #[test]
    fn low_confidence_forces_manual_review() {
        let r = resolver();
        let ctx = context("text", vec![cand(json!("a"), 0.2, "ocr"), cand(json!("b"), 0.4, "ocr")]);
        let out = r.resolve(&ctx).unwrap();
        assert_eq!(out.strategy_key, "manual_review");
        assert!(out.requires_review);
        assert_eq!(out.final_confidence, 0.0);
        assert_eq!(out.diagnostics["selection"], json!("below_review_threshold"));
    }

    #[test]
    fn type_override_takes_precedence_over_classifier() {
        let r = resolver();
        let ctx = context(
            "date",
            vec![cand(json!("2024-01-01"), 0.9, "ocr"), cand(json!("2024-02-01"), 0.6, "ocr")],
        );
        let out = r.resolve(&ctx).unwrap();
        assert_eq!(out.strategy_key, "latest_value");
        assert_eq!(out.diagnostics["selection"], json!("type_override"));
    }

    #[test]
    fn unknown_override_falls_back() {
        let mut cfg = ConflictResolutionConfig::default();
        cfg.type_specific_strategies
            .insert("currency".to_string(), "coin_flip".to_string());
        let r = ConflictResolver::new(cfg).unwrap();
        let ctx = context("currency", vec![cand(json!(1), 0.8, "ocr"), cand(json!(2), 0.81, "ocr")]);
        let out = r.resolve(&ctx).unwrap();
        assert_eq!(out.strategy_key, "highest_confidence");
        assert_eq!(out.diagnostics["selection"], json!("unknown_override"));
    }

    #[test]
    fn disallowed_classifier_choice_uses_highest_confidence() {
        let cfg = ConflictResolutionConfig {
            default_strategies: vec!["highest_confidence".to_string()],
            ..ConflictResolutionConfig::default()
        };
        let r = ConflictResolver::new(cfg).unwrap();
        let ctx = context("number", vec![cand(json!(100), 0.8, "ocr"), cand(json!(110), 0.82, "ocr")]);
        assert_eq!(r.resolve(&ctx).unwrap().strategy_key, "highest_confidence");
    }

    #[test]
    fn empty_candidates_record_nothing() {
        let r = resolver();
        let ctx = context("text", Vec::new());
        let err = r.resolve(&ctx).unwrap_err();
        assert!(err.is_validation());
        assert!(r.audit_trail(None).is_empty());
        assert_eq!(r.statistics().total_resolutions, 0);
    }

    #[test]
    fn numeric_failure_keeps_detected_entry_only() {
        let mut cfg = ConflictResolutionConfig::default();
        cfg.type_specific_strategies
            .insert("number".to_string(), "numeric_averaging".to_string());
        let r = ConflictResolver::new(cfg).unwrap();
        let ctx = context("number", vec![cand(json!("n/a"), 0.8, "ocr"), cand(json!("tbd"), 0.9, "ocr")]);

        let err = r.resolve(&ctx).unwrap_err();
        assert!(matches!(
            err,
            AdjudicatorError::Resolution(ResolutionError::NoValidNumericValues { .. })
        ));
        let trail = r.audit_trail(None);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Detected);
        assert!(r.conflict_history("deal-1", "rent_roll", "loan_amount").is_empty());
    }

    #[test]
    fn detected_precedes_resolved() {
        let r = resolver();
        let ctx = context("text", vec![cand(json!("a"), 0.6, "ocr"), cand(json!("b"), 0.9, "ocr")]);
        r.resolve(&ctx).unwrap();

        let record = r.conflict_history("deal-1", "rent_roll", "loan_amount").pop().unwrap();
        let trail = r.audit_trail(Some(record.id));
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::Detected);
        assert_eq!(trail[1].action, AuditAction::Resolved);
        assert_eq!(trail[1].confidence, Some(0.9));
    }

    #[test]
    fn history_is_trimmed_per_key() {
        let cfg = ConflictResolutionConfig {
            max_history_entries: 3,
            ..ConflictResolutionConfig::default()
        };
        let r = ConflictResolver::new(cfg).unwrap();
        for i in 0..5 {
            let ctx = context(
                "text",
                vec![cand(json!(format!("v{i}")), 0.95, "ocr"), cand(json!("other"), 0.6, "ocr")],
            );
            r.resolve(&ctx).unwrap();
        }
        let history = r.conflict_history("deal-1", "rent_roll", "loan_amount");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].resolved_value, json!("v2"));
        assert_eq!(history[2].resolved_value, json!("v4"));
    }

    #[test]
    fn audit_trail_can_be_disabled() {
        let cfg = ConflictResolutionConfig {
            enable_audit_trail: false,
            ..ConflictResolutionConfig::default()
        };
        let r = ConflictResolver::new(cfg).unwrap();
        let ctx = context("text", vec![cand(json!("a"), 0.6, "ocr"), cand(json!("b"), 0.9, "ocr")]);
        r.resolve(&ctx).unwrap();
        assert!(r.audit_trail(None).is_empty());
        assert_eq!(r.statistics().total_resolutions, 1);
    }

    #[test]
    fn learned_adjustment_lowers_confidence_when_enabled() {
        let bias = Arc::new(StaticBias::new());
        bias.set("loan_amount", 0.45);
        let cfg = ConflictResolutionConfig {
            apply_learned_adjustments: true,
            ..ConflictResolutionConfig::default()
        };
        let r = ConflictResolver::new(cfg).unwrap().with_bias(bias);
        let ctx = context("text", vec![cand(json!("a"), 0.6, "ocr"), cand(json!("b"), 0.9, "ocr")]);

        let out = r.resolve(&ctx).unwrap();
        assert!((out.final_confidence - 0.45).abs() < 1e-9);
        assert!(out.requires_review);
        assert_eq!(out.diagnostics["learned_adjustment"], json!(0.45));
    }

    #[test]
    fn learned_adjustment_ignored_when_disabled() {
        let bias = Arc::new(StaticBias::new());
        bias.set("loan_amount", 0.45);
        let r = resolver().with_bias(bias);
        let ctx = context("text", vec![cand(json!("a"), 0.6, "ocr"), cand(json!("b"), 0.9, "ocr")]);
        let out = r.resolve(&ctx).unwrap();
        assert!((out.final_confidence - 0.9).abs() < 1e-12);
        assert!(!out.diagnostics.contains_key("learned_adjustment"));
    }

    #[test]
    fn mark_reviewed_clears_flag() {
        let r = resolver();
        let ctx = ConflictContext::builder()
            .deal("deal-1")
            .template("rent_roll")
            .field("loan_amount", "text")
            .candidate(cand(json!("a"), 0.9, "ocr"))
            .require_review()
            .build()
            .unwrap();
        r.resolve(&ctx).unwrap();
        let id = r.conflict_history("deal-1", "rent_roll", "loan_amount")[0].id;

        let reviewed = r.mark_reviewed(id, "analyst", "looks right").unwrap();
        assert!(!reviewed.requires_review);
        assert!(reviewed.notes.ends_with("looks right"));
        let trail = r.audit_trail(Some(id));
        assert_eq!(trail.last().unwrap().action, AuditAction::Reviewed);

        let missing = r.mark_reviewed(ConflictId::new(), "analyst", "").unwrap_err();
        assert!(missing.is_resolution());
    }

    #[test]
    fn override_appends_manual_record() {
        let r = resolver();
        let ctx = context("text", vec![cand(json!("a"), 0.6, "ocr"), cand(json!("b"), 0.9, "ocr")]);
        r.resolve(&ctx).unwrap();

        let record = r
            .override_resolution("deal-1", "rent_roll", "loan_amount", json!("c"), "analyst", "per lease")
            .unwrap();
        assert_eq!(record.strategy_key, MANUAL_OVERRIDE_KEY);
        assert_eq!(record.final_confidence, 1.0);

        let history = r.conflict_history("deal-1", "rent_roll", "loan_amount");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].resolved_value, json!("c"));

        let entry = r.audit_trail(Some(record.id)).pop().unwrap();
        assert_eq!(entry.action, AuditAction::Overridden);
        assert_eq!(entry.before_state, Some(json!("b")));
        assert_eq!(entry.after_state, Some(json!("c")));
    }

    #[test]
    fn update_configuration_validates() {
        let r = resolver();
        let bad = ConflictResolutionConfig {
            review_threshold: -0.1,
            ..ConflictResolutionConfig::default()
        };
        assert!(r.update_configuration(bad).is_err());
        assert!((r.configuration().review_threshold - 0.5).abs() < f64::EPSILON);

        let good = ConflictResolutionConfig {
            review_threshold: 0.95,
            ..ConflictResolutionConfig::default()
        };
        r.update_configuration(good).unwrap();
        let ctx = context("text", vec![cand(json!("a"), 0.6, "ocr"), cand(json!("b"), 0.9, "ocr")]);
        assert_eq!(r.resolve(&ctx).unwrap().strategy_key, "manual_review");
    }

    #[test]
    fn strategies_listed_by_priority() {
        let keys: Vec<String> = resolver().strategies().into_iter().map(|d| d.key).collect();
        assert_eq!(
            keys,
            vec![
                "highest_confidence",
                "numeric_averaging",
                "latest_value",
                "source_priority",
                "manual_review"
            ]
        );
    }

    #[test]
    fn flush_without_directory_is_noop() {
        assert!(resolver().flush().is_ok());
    }
}
