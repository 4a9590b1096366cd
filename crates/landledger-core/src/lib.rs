//! # landledger-core
//!
//! The seams of the landledger audit core.
//!
//! This crate provides:
//! - The `AuditStore` and `RiskEngine` traits the audit service is built on
//! - `PropertyLocks`, which serializes chain appends per property
//!
//! ## Usage
//!
//! ```rust,ignore
//! use landledger_core::{traits::{AuditStore, RiskEngine}, PropertyLocks};
//! ```

pub mod locks;
pub mod traits;

pub use locks::PropertyLocks;

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use landledger_contracts::property::PropertyId;

    use super::PropertyLocks;

    /// Two threads working on the same property never overlap inside the lock.
    #[test]
    fn same_property_is_serialized() {
        let locks = Arc::new(PropertyLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let id = PropertyId::new("prop-1");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        locks.with_lock(&id, || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(50));
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1, "critical sections overlapped");
    }

    #[test]
    fn with_lock_returns_closure_value() {
        let locks = PropertyLocks::new();
        let value = locks.with_lock(&PropertyId::new("p"), || 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn slots_are_released_when_idle() {
        let locks = PropertyLocks::new();
        let held = locks.with_lock(&PropertyId::new("a"), || {
            locks.with_lock(&PropertyId::new("b"), || locks.len())
        });
        assert_eq!(held, 2, "both nested slots registered while held");

        for i in 0..1000 {
            locks.with_lock(&PropertyId::new(format!("prop-{i}")), || ());
        }
        assert!(locks.is_empty(), "idle slots left: {}", locks.len());
    }

    #[test]
    fn prune_drops_slots_left_by_a_panic() {
        let locks = PropertyLocks::new();
        let id = PropertyId::new("a");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            locks.with_lock(&id, || panic!("append failed mid-flight"))
        }));
        assert!(outcome.is_err());
        assert_eq!(locks.len(), 1);

        locks.prune();
        assert!(locks.is_empty());

        // The poisoned slot is gone; the property locks normally again.
        assert_eq!(locks.with_lock(&id, || 7), 7);
    }
}
