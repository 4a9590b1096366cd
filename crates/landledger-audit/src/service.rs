//! The audit service: the single write entry point for property mutations.
//!
//! `append` runs, under the property's lock:
//!
//! 1. read the latest entry (its hash becomes `prev_hash`)
//! 2. assess risk against that entry and the store's history
//! 3. `hash = digest(changes, prev_hash)`
//! 4. persist the entry, then its `RiskAssessment`
//!
//! A fraud flag annotates the entry; it never rejects the mutation.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use landledger_contracts::{
    audit::{AuditLogEntry, RiskAssessment, VerificationResult},
    error::LedgerResult,
    property::{AuditEvent, PropertyId},
};
use landledger_core::{
    traits::{AuditStore, RiskEngine},
    PropertyLocks,
};

use crate::chain::{digest, verify_chain};

/// Orchestrates risk assessment and hash-chain appends over a store.
///
/// Construct once and share by reference or `Arc`; there is no ambient
/// global instance.
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    engine: Arc<dyn RiskEngine>,
    locks: PropertyLocks,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>, engine: Arc<dyn RiskEngine>) -> Self {
        Self {
            store,
            engine,
            locks: PropertyLocks::new(),
        }
    }

    /// Record one mutation and return the stored entry.
    ///
    /// # Errors
    ///
    /// Any storage failure aborts the append and propagates; an entry is
    /// never silently skipped.  Model unavailability is not an error.
    pub fn append(&self, event: AuditEvent) -> LedgerResult<AuditLogEntry> {
        let property_id = event.property_id.clone();
        let entry = self
            .locks
            .with_lock(&property_id, || self.append_locked(event))?;

        self.engine.entry_recorded(&self.store);
        Ok(entry)
    }

    fn append_locked(&self, mut event: AuditEvent) -> LedgerResult<AuditLogEntry> {
        let previous = self.store.latest_entry(&event.property_id)?;

        if let Some(prev) = &previous {
            if event.timestamp < prev.timestamp {
                debug!(
                    property_id = %event.property_id,
                    supplied = %event.timestamp,
                    latest = %prev.timestamp,
                    "event timestamp raised to latest entry"
                );
                event.timestamp = prev.timestamp;
            }
        }

        let decision = self
            .engine
            .assess(&event, previous.as_ref(), self.store.as_ref())?;

        let prev_hash = previous.map(|p| p.hash);
        let hash = digest(&event.changes, prev_hash.as_deref())?;

        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            property_id: event.property_id,
            action: event.action,
            changes: event.changes,
            hash,
            prev_hash,
            timestamp: event.timestamp,
            user: event.user,
            fraud_detected: decision.fraud_detected,
            fraud_reason: decision.fraud_reason.clone(),
        };

        let assessment = RiskAssessment {
            id: Uuid::new_v4(),
            entry_id: entry.id,
            property_id: entry.property_id.clone(),
            timestamp: entry.timestamp,
            user_id: entry.actor_identity().map(str::to_string),
            risk_score: decision.final_score,
            ml_score: decision.ml_score,
            risk_factors: decision.risk_factors(),
            reasons: decision.reasons,
        };

        self.store.insert_entry(&entry)?;
        self.store.insert_assessment(&assessment)?;

        info!(
            property_id = %entry.property_id,
            action = %entry.action,
            hash = %entry.hash,
            risk_score = assessment.risk_score,
            fraud_detected = entry.fraud_detected,
            "audit entry appended"
        );
        if entry.fraud_detected {
            warn!(
                property_id = %entry.property_id,
                risk_score = assessment.risk_score,
                reason = entry.fraud_reason.as_deref().unwrap_or(""),
                "possible fraud flagged"
            );
        }

        Ok(entry)
    }

    /// Recompute one property's chain and report the first break, if any.
    pub fn verify(&self, property_id: &PropertyId) -> LedgerResult<VerificationResult> {
        let entries = self.store.entries_for_property(property_id)?;
        let result = verify_chain(&entries);

        if result.ok {
            debug!(
                property_id = %property_id,
                entries = result.entries_checked,
                "audit chain verified"
            );
        } else {
            warn!(
                property_id = %property_id,
                broken_at_index = ?result.broken_at_index,
                reason = ?result.reason,
                "audit chain broken"
            );
        }
        Ok(result)
    }

    /// Properties currently holding a lock slot.
    #[cfg(test)]
    pub(crate) fn lock_slots(&self) -> usize {
        self.locks.len()
    }

    /// Every entry for the property, oldest first.
    pub fn history(&self, property_id: &PropertyId) -> LedgerResult<Vec<AuditLogEntry>> {
        self.store.entries_for_property(property_id)
    }
}
