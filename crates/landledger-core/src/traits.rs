//! Core trait definitions for the landledger audit pipeline.
//!
//! These two traits define the boundary between the audit core and its
//! collaborators:
//!
//! - `AuditStore` — durable storage owned by the hosting application
//! - `RiskEngine` — scores each mutation before its entry is hashed
//!
//! The audit service wires them together: read latest → assess → hash →
//! persist.

use std::sync::Arc;

use landledger_contracts::{
    audit::{AuditLogEntry, RiskAssessment},
    error::LedgerResult,
    property::{AuditEvent, PropertyId, PropertySample},
    risk::RiskDecision,
};

/// The storage collaborator.
///
/// Implementations own durability.  The core only ever inserts into the
/// audit and assessment collections; it never updates or deletes them.
/// Every read is bounded and indexed (by property, by actor, by time) and is
/// the only point where the append path may block on I/O.
pub trait AuditStore: Send + Sync {
    /// Append one audit entry.
    ///
    /// Implementations that support conditional writes should reject the
    /// entry with `LedgerError::ChainConflict` when `entry.prev_hash` is not
    /// the property's current latest hash.
    fn insert_entry(&self, entry: &AuditLogEntry) -> LedgerResult<()>;

    /// Append one risk assessment.
    fn insert_assessment(&self, assessment: &RiskAssessment) -> LedgerResult<()>;

    /// The most recent entry for `property_id`, or `None` for a new chain.
    fn latest_entry(&self, property_id: &PropertyId) -> LedgerResult<Option<AuditLogEntry>>;

    /// Every entry for `property_id`, oldest first.
    fn entries_for_property(&self, property_id: &PropertyId) -> LedgerResult<Vec<AuditLogEntry>>;

    /// Up to `limit` entries recorded for the actor, newest first.
    fn recent_entries_by_user(&self, user_id: &str, limit: usize)
        -> LedgerResult<Vec<AuditLogEntry>>;

    /// Up to `limit` entries across all properties, newest first.
    fn recent_entries(&self, limit: usize) -> LedgerResult<Vec<AuditLogEntry>>;

    /// Up to `limit` known properties at `location`, most recently updated
    /// first, excluding `exclude`.
    fn market_sample(
        &self,
        location: &str,
        exclude: &PropertyId,
        limit: usize,
    ) -> LedgerResult<Vec<PropertySample>>;
}

/// The risk engine: scores one mutation against its history.
///
/// Implementations must degrade rather than fail when their statistical
/// model is unavailable.  Only storage failures propagate as errors.
pub trait RiskEngine: Send + Sync {
    /// Score `event` given the property's previous entry (if any).
    ///
    /// The engine may issue further bounded reads against `store`.
    fn assess(
        &self,
        event: &AuditEvent,
        previous: Option<&AuditLogEntry>,
        store: &dyn AuditStore,
    ) -> LedgerResult<RiskDecision>;

    /// Called after an entry has been durably recorded.
    ///
    /// Engines with a retrain policy use this to count appends and schedule
    /// model refreshes.  The default does nothing.
    fn entry_recorded(&self, _store: &Arc<dyn AuditStore>) {}
}
