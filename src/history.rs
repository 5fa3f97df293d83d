//! Per-field resolution history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::{history_key, CandidateValue};
use crate::conflict::{ConflictId, ConflictType};

/// Strategy key recorded for a human override.
pub const MANUAL_OVERRIDE_KEY: &str = "manual_override";

/// Actor recorded for automated resolutions.
pub const SYSTEM_ACTOR: &str = "system";

/// A persisted resolution, one per `resolve` call or override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Conflict id shared with the audit entries of this attempt.
    pub id: ConflictId,
    /// Deal the field belongs to.
    pub deal_id: String,
    /// Template path of the field.
    pub template_path: String,
    /// Field name.
    pub field_name: String,
    /// How the candidates disagreed.
    pub conflict_type: ConflictType,
    /// Candidates as submitted.
    pub candidates: Vec<CandidateValue>,
    /// Chosen value.
    pub resolved_value: Value,
    /// Key of the strategy that produced it.
    pub strategy_key: String,
    /// Confidence after bias and clamping.
    pub final_confidence: f64,
    /// Still needs a human decision.
    pub requires_review: bool,
    /// When the record was written.
    pub resolved_at: DateTime<Utc>,
    /// `system` or the reviewer who overrode it.
    pub resolved_by: String,

    /// Strategy notes, plus review or override notes.
    #[serde(default)]
    pub notes: String,
}

impl ResolutionRecord {
    /// `deal:template:field` key this record is filed under.
    #[must_use]
    pub fn history_key(&self) -> String {
        history_key(&self.deal_id, &self.template_path, &self.field_name)
    }
}

/// Records grouped by `deal:template:field`, each list oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionHistory {
    by_key: BTreeMap<String, Vec<ResolutionRecord>>,
}

impl ResolutionHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, dropping the oldest entries for its key beyond
    /// `max_per_key`.
    pub fn append(&mut self, record: ResolutionRecord, max_per_key: usize) {
        let records = self.by_key.entry(record.history_key()).or_default();
        records.push(record);
        let max_per_key = max_per_key.max(1);
        if records.len() > max_per_key {
            let excess = records.len() - max_per_key;
            records.drain(..excess);
        }
    }

    /// Records for one field, oldest first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[ResolutionRecord]> {
        self.by_key.get(key).map(Vec::as_slice)
    }

    /// Most recent record for one field.
    #[must_use]
    pub fn latest(&self, key: &str) -> Option<&ResolutionRecord> {
        self.by_key.get(key).and_then(|r| r.last())
    }

    /// Every field history belonging to a deal.
    #[must_use]
    pub fn for_deal(&self, deal_id: &str) -> BTreeMap<String, Vec<ResolutionRecord>> {
        let prefix = format!("{deal_id}:");
        self.by_key
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, records)| (key.clone(), records.clone()))
            .collect()
    }

    /// Finds a record by id.
    pub fn find_mut(&mut self, id: ConflictId) -> Option<&mut ResolutionRecord> {
        self.by_key
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| r.id == id)
    }

    /// Every record, grouped by key.
    pub fn records(&self) -> impl Iterator<Item = &ResolutionRecord> {
        self.by_key.values().flatten()
    }

    /// Number of distinct fields with history.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    /// Number of records across all fields.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    /// Aggregates counts and rates over every stored record.
    #[must_use]
    pub fn statistics(&self) -> ResolutionStatistics {
        let mut stats = ResolutionStatistics::default();
        let mut confidence_sum = 0.0;
        let mut reviews = 0usize;

        for record in self.records() {
            stats.total_resolutions += 1;
            *stats.by_strategy.entry(record.strategy_key.clone()).or_default() += 1;
            *stats.by_conflict_type.entry(record.conflict_type).or_default() += 1;
            confidence_sum += record.final_confidence;
            if record.requires_review {
                reviews += 1;
            }
        }

        if stats.total_resolutions > 0 {
            #[allow(clippy::cast_precision_loss)]
            let total = stats.total_resolutions as f64;
            #[allow(clippy::cast_precision_loss)]
            let reviews = reviews as f64;
            stats.review_rate = reviews / total;
            stats.average_confidence = confidence_sum / total;
        }
        stats
    }
}

/// Summary over the stored resolution history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStatistics {
    /// Records counted.
    pub total_resolutions: usize,
    /// Record count per strategy key.
    pub by_strategy: BTreeMap<String, usize>,
    /// Record count per conflict type.
    pub by_conflict_type: BTreeMap<ConflictType, usize>,

    /// Fraction of records flagged for review.
    pub review_rate: f64,
    /// Mean final confidence.
    pub average_confidence: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(deal: &str, field: &str, strategy: &str, confidence: f64, review: bool) -> ResolutionRecord {
        ResolutionRecord {
            id: ConflictId::new(),
            deal_id: deal.to_string(),
            template_path: "tpl".to_string(),
            field_name: field.to_string(),
            conflict_type: ConflictType::Confidence,
            candidates: Vec::new(),
            resolved_value: json!(confidence),
            strategy_key: strategy.to_string(),
            final_confidence: confidence,
            requires_review: review,
            resolved_at: Utc::now(),
            resolved_by: SYSTEM_ACTOR.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn trims_oldest_per_key() {
        let mut history = ResolutionHistory::new();
        for i in 0..13 {
            history.append(record("d1", "amount", "highest_confidence", f64::from(i) / 100.0, false), 10);
        }
        history.append(record("d1", "rate", "highest_confidence", 0.5, false), 10);

        let amount = history.get("d1:tpl:amount").unwrap();
        assert_eq!(amount.len(), 10);
        assert_eq!(amount[0].resolved_value, json!(0.03));
        assert_eq!(amount[9].resolved_value, json!(0.12));
        assert_eq!(history.get("d1:tpl:rate").unwrap().len(), 1);
        assert_eq!(history.total_records(), 11);
    }

    #[test]
    fn for_deal_does_not_match_prefix_collisions() {
        let mut history = ResolutionHistory::new();
        history.append(record("d1", "a", "highest_confidence", 0.9, false), 10);
        history.append(record("d10", "a", "highest_confidence", 0.9, false), 10);
        let deal = history.for_deal("d1");
        assert_eq!(deal.len(), 1);
        assert!(deal.contains_key("d1:tpl:a"));
    }

    #[test]
    fn statistics_aggregate_records() {
        let mut history = ResolutionHistory::new();
        history.append(record("d1", "a", "highest_confidence", 0.8, false), 10);
        history.append(record("d1", "b", "manual_review", 0.0, true), 10);
        history.append(record("d2", "a", "highest_confidence", 1.0, false), 10);

        let stats = history.statistics();
        assert_eq!(stats.total_resolutions, 3);
        assert_eq!(stats.by_strategy["highest_confidence"], 2);
        assert_eq!(stats.by_conflict_type[&ConflictType::Confidence], 3);
        assert!((stats.review_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!((stats.average_confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn find_mut_locates_by_id() {
        let mut history = ResolutionHistory::new();
        let r = record("d1", "a", "highest_confidence", 0.4, true);
        let id = r.id;
        history.append(r, 10);
        history.find_mut(id).unwrap().requires_review = false;
        assert!(!history.latest("d1:tpl:a").unwrap().requires_review);
    }
}
