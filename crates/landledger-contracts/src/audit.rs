//! Audit records and chain verification results.
//!
//! `AuditLogEntry` is what gets written to the audit log, one per mutation.
//! `RiskAssessment` is written alongside it.  Neither is ever modified once
//! stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::property::{Action, Changes, PropertyId, UserRef};

/// One immutable, hash-linked record of a single property mutation.
///
/// For the ordered entries of one property, entry 0 has no `prev_hash` and
/// every later entry's `prev_hash` equals the preceding entry's `hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub property_id: PropertyId,
    pub action: Action,
    /// Snapshot of the changed fields at the time of the event.
    pub changes: Changes,
    /// SHA-256 (lowercase hex) over the canonical encoding of `changes`
    /// and `prev_hash`.
    pub hash: String,
    /// `hash` of the previous entry for the same property.
    pub prev_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub user: Option<UserRef>,
    pub fraud_detected: bool,
    /// Triggered reasons joined in evaluation order.
    pub fraud_reason: Option<String>,
}

impl AuditLogEntry {
    pub fn actor_identity(&self) -> Option<&str> {
        self.user.as_ref().map(UserRef::identity)
    }
}

/// The risk evaluation recorded for every audit event, flagged or not.
///
/// Kept independently of the boolean decision so that later analysis and
/// model retraining see the full population of scored events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    /// The audit entry this assessment belongs to.
    pub entry_id: Uuid,
    pub property_id: PropertyId,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    /// Weighted final score in [0, 1].
    pub risk_score: f64,
    /// Anomaly-model score in [0, 1]; 0 when no model was available.
    pub ml_score: f64,
    /// Factor name → contributing score, for every factor that triggered.
    pub risk_factors: BTreeMap<String, f64>,
    pub reasons: Vec<String>,
}

/// Why a chain failed verification at a given index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreak {
    /// The recomputed digest differs from the stored `hash`.
    HashMismatch,
    /// The stored `prev_hash` does not point at the preceding entry.
    LinkMismatch,
}

/// Structured outcome of walking one property's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub ok: bool,
    /// Index of the first entry that failed, oldest entry = 0.
    pub broken_at_index: Option<usize>,
    pub reason: Option<ChainBreak>,
    /// Number of entries examined.
    pub entries_checked: usize,
}

impl VerificationResult {
    pub fn valid(entries_checked: usize) -> Self {
        Self {
            ok: true,
            broken_at_index: None,
            reason: None,
            entries_checked,
        }
    }

    pub fn broken(index: usize, reason: ChainBreak, entries_checked: usize) -> Self {
        Self {
            ok: false,
            broken_at_index: Some(index),
            reason: Some(reason),
            entries_checked,
        }
    }
}
