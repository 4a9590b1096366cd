//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` is the reference storage collaborator.  It keeps the
//! audit log, the risk assessments, and a small `properties` table (the
//! market sample) in `Vec`s and a map behind one `Mutex`, so it can be shared
//! across threads as an `Arc<dyn AuditStore>`.
//!
//! Appends are conditional: an entry whose `prev_hash` is not the property's
//! current latest hash is rejected with `LedgerError::ChainConflict`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use landledger_contracts::{
    audit::{AuditLogEntry, RiskAssessment},
    error::{LedgerError, LedgerResult},
    property::{price_of, Action, PropertyId, PropertySample},
};
use landledger_core::traits::AuditStore;

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct InMemoryState {
    /// Every audit entry, in append order.
    pub(crate) entries: Vec<AuditLogEntry>,

    pub(crate) assessments: Vec<RiskAssessment>,

    /// The read-only `properties` sample, keyed by property.
    pub(crate) properties: HashMap<PropertyId, PropertySample>,
}

impl InMemoryState {
    fn latest_hash(&self, property_id: &PropertyId) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| &e.property_id == property_id)
            .map(|e| e.hash.as_str())
    }

    /// Mirror a recorded mutation into the properties table.
    ///
    /// Creates and updates merge whatever `location`/`price` the change-set
    /// carries; a property only enters the sample once both are known.
    fn apply_to_properties(&mut self, entry: &AuditLogEntry) {
        if entry.action == Action::Delete {
            self.properties.remove(&entry.property_id);
            return;
        }

        let location = entry
            .changes
            .get("location")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let price = price_of(&entry.changes);

        match self.properties.get_mut(&entry.property_id) {
            Some(sample) => {
                if let Some(location) = location {
                    sample.location = location;
                }
                if let Some(price) = price {
                    sample.price = price;
                }
                sample.updated_at = entry.timestamp;
            }
            None => {
                if let (Some(location), Some(price)) = (location, price) {
                    self.properties.insert(
                        entry.property_id.clone(),
                        PropertySample {
                            property_id: entry.property_id.clone(),
                            location,
                            price,
                            updated_at: entry.timestamp,
                        },
                    );
                }
            }
        }
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An in-memory, append-only audit store.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct InMemoryAuditStore {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState {
                entries: Vec::new(),
                assessments: Vec::new(),
                properties: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| LedgerError::StorageUnavailable {
            reason: format!("audit store lock poisoned: {}", e),
        })
    }

    /// Insert or replace a row of the properties table directly.
    ///
    /// Used to seed market context for properties whose history predates the
    /// audit log.
    pub fn upsert_property(&self, sample: PropertySample) -> LedgerResult<()> {
        let mut state = self.lock()?;
        state.properties.insert(sample.property_id.clone(), sample);
        Ok(())
    }

    /// Every stored entry, in append order.
    pub fn entries(&self) -> LedgerResult<Vec<AuditLogEntry>> {
        Ok(self.lock()?.entries.clone())
    }

    /// Every stored risk assessment, in append order.
    pub fn assessments(&self) -> LedgerResult<Vec<RiskAssessment>> {
        Ok(self.lock()?.assessments.clone())
    }

    /// Rewrite the `index`-th stored entry of `property_id` in place,
    /// bypassing the append path entirely.
    ///
    /// This is what an attacker with direct storage access can do; it exists
    /// for verification drills.  Returns `false` when there is no such entry.
    pub fn tamper(
        &self,
        property_id: &PropertyId,
        index: usize,
        f: impl FnOnce(&mut AuditLogEntry),
    ) -> LedgerResult<bool> {
        let mut state = self.lock()?;
        match state
            .entries
            .iter_mut()
            .filter(|e| &e.property_id == property_id)
            .nth(index)
        {
            Some(entry) => {
                f(entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ── AuditStore impl ───────────────────────────────────────────────────────────

impl AuditStore for InMemoryAuditStore {
    fn insert_entry(&self, entry: &AuditLogEntry) -> LedgerResult<()> {
        let mut state = self.lock()?;

        let found = state.latest_hash(&entry.property_id);
        if found != entry.prev_hash.as_deref() {
            return Err(LedgerError::ChainConflict {
                property_id: entry.property_id.to_string(),
                expected: entry.prev_hash.clone(),
                found: found.map(str::to_string),
            });
        }

        state.apply_to_properties(entry);
        state.entries.push(entry.clone());
        debug!(
            property_id = %entry.property_id,
            entry_count = state.entries.len(),
            "audit entry stored"
        );
        Ok(())
    }

    fn insert_assessment(&self, assessment: &RiskAssessment) -> LedgerResult<()> {
        self.lock()?.assessments.push(assessment.clone());
        Ok(())
    }

    fn latest_entry(&self, property_id: &PropertyId) -> LedgerResult<Option<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(state
            .entries
            .iter()
            .rev()
            .find(|e| &e.property_id == property_id)
            .cloned())
    }

    fn entries_for_property(&self, property_id: &PropertyId) -> LedgerResult<Vec<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| &e.property_id == property_id)
            .cloned()
            .collect())
    }

    fn recent_entries_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(newest_first(
            state.entries.iter().filter(|e| e.actor_identity() == Some(user_id)),
            limit,
        ))
    }

    fn recent_entries(&self, limit: usize) -> LedgerResult<Vec<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(newest_first(state.entries.iter(), limit))
    }

    fn market_sample(
        &self,
        location: &str,
        exclude: &PropertyId,
        limit: usize,
    ) -> LedgerResult<Vec<PropertySample>> {
        let state = self.lock()?;
        let mut rows: Vec<&PropertySample> = state
            .properties
            .values()
            .filter(|s| s.location == location && &s.property_id != exclude)
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.property_id.cmp(&b.property_id))
        });
        Ok(rows.into_iter().take(limit).cloned().collect())
    }
}

/// Sort by timestamp descending; among equal timestamps the later append
/// comes first.
fn newest_first<'a>(
    entries: impl DoubleEndedIterator<Item = &'a AuditLogEntry>,
    limit: usize,
) -> Vec<AuditLogEntry> {
    let mut rows: Vec<&AuditLogEntry> = entries.rev().collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.into_iter().take(limit).cloned().collect()
}
