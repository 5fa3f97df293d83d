//! Audit trail of resolution lifecycle actions.
//!
//! Entries are append-only and exist for traceability; the resolution
//! algorithms never read them back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::conflict::ConflictId;

/// Unique identifier for an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(Uuid);

impl AuditId {
    /// Creates a new random audit ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle action recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Conflicting candidates were received.
    Detected,
    /// A strategy produced a value.
    Resolved,
    /// A human confirmed a resolution.
    Reviewed,
    /// A human replaced a resolution.
    Overridden,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected => write!(f, "detected"),
            Self::Resolved => write!(f, "resolved"),
            Self::Reviewed => write!(f, "reviewed"),
            Self::Overridden => write!(f, "overridden"),
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id of this entry.
    pub id: AuditId,
    /// Resolution attempt the entry belongs to.
    pub conflict_id: ConflictId,
    /// What happened.
    pub action: AuditAction,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Who did it (`system` for automated steps).
    pub actor: String,
    /// Human-readable summary.
    pub details: String,

    /// State before the action, for reviews and overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_state: Option<Value>,

    /// State after the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_state: Option<Value>,

    /// Confidence attached to the action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl AuditEntry {
    /// Creates an entry stamped now.
    #[must_use]
    pub fn new(
        conflict_id: ConflictId,
        action: AuditAction,
        actor: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditId::new(),
            conflict_id,
            action,
            timestamp: Utc::now(),
            actor: actor.into(),
            details: details.into(),
            before_state: None,
            after_state: None,
            confidence: None,
        }
    }

    /// Attaches before/after snapshots.
    #[must_use]
    pub fn with_states(mut self, before: Option<Value>, after: Option<Value>) -> Self {
        self.before_state = before;
        self.after_state = after;
        self
    }

    /// Attaches a confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Bounded, insertion-ordered audit trail.
///
/// The trail grows to twice the configured bound, then drops its oldest
/// entries back down to the bound, so trimming cost is amortised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, trimming when the trail exceeds `2 * max_entries`.
    pub fn append(&mut self, entry: AuditEntry, max_entries: usize) {
        self.entries.push(entry);
        let max_entries = max_entries.max(1);
        if self.entries.len() > max_entries.saturating_mul(2) {
            let excess = self.entries.len() - max_entries;
            self.entries.drain(..excess);
        }
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries belonging to one resolution attempt, oldest first.
    #[must_use]
    pub fn for_conflict(&self, conflict_id: ConflictId) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.conflict_id == conflict_id)
            .cloned()
            .collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
