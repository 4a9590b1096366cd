//! Per-property mutual exclusion for chain appends.
//!
//! Reading a property's latest entry and writing its successor must happen
//! under one lock, or two concurrent appends can both link to the same
//! predecessor and fork the chain.  Different properties never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use landledger_contracts::property::PropertyId;

/// A registry of one mutex per property id.
#[derive(Debug, Default)]
pub struct PropertyLocks {
    inner: Mutex<HashMap<PropertyId, Arc<Mutex<()>>>>,
}

impl PropertyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `property_id`.
    ///
    /// The protected value is `()`, so a poisoned lock carries no broken
    /// state and is simply recovered.  The property's slot is released
    /// afterwards once no other caller is waiting on it, so the registry only
    /// holds properties with appends in flight.
    pub fn with_lock<R>(&self, property_id: &PropertyId, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(property_id.clone()).or_default())
        };

        trace!(property_id = %property_id, "acquiring property lock");
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        self.release(property_id, &lock);
        result
    }

    /// Remove `property_id`'s slot if `lock` is it and only the registry and
    /// this caller still reference it.  Clones are taken under the registry
    /// mutex, so none can appear while the count is checked.
    fn release(&self, property_id: &PropertyId, lock: &Arc<Mutex<()>>) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = map
            .get(property_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, lock) && Arc::strong_count(slot) == 2);
        if idle {
            map.remove(property_id);
        }
    }

    /// Drop registry slots that no caller is currently holding, such as
    /// those left behind when `f` panicked.
    pub fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of properties with a registered lock.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
