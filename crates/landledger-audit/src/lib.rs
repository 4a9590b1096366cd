//! # landledger-audit
//!
//! Append-only, SHA-256 hash-chained audit log for property mutations.
//!
//! ## Overview
//!
//! Every mutation the CRUD layer reports becomes an `AuditLogEntry` whose
//! `hash` commits to its change-set and to the previous entry's hash for the
//! same property.  Rewriting any stored entry after the fact breaks the chain
//! and is reported by [`verify_chain`] as the index of the first bad entry.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use landledger_audit::{AuditService, InMemoryAuditStore};
//!
//! let service = AuditService::new(Arc::new(InMemoryAuditStore::new()), Arc::new(engine));
//! let entry = service.append(event)?;
//! assert!(service.verify(&entry.property_id)?.ok);
//! ```

pub mod chain;
pub mod memory;
pub mod service;

pub use chain::{canonical_encode, digest, encode_changes, verify_chain};
pub use memory::InMemoryAuditStore;
pub use service::AuditService;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use landledger_contracts::{
        audit::{AuditLogEntry, ChainBreak, RiskAssessment},
        error::{LedgerError, LedgerResult},
        property::{Action, AuditEvent, Changes, PropertyId, PropertySample, UserRef},
        risk::{RiskDecision, RiskFactor},
    };
    use landledger_core::traits::{AuditStore, RiskEngine};

    use super::{digest, encode_changes, verify_chain, AuditService, InMemoryAuditStore};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn changes(price: u64) -> Changes {
        let mut c = Changes::new();
        c.insert("location".to_string(), json!("4 Mill Lane, Otley"));
        c.insert("price".to_string(), json!(price));
        c.insert("buyer_intent".to_string(), json!("sale"));
        c
    }

    fn event(property: &str, action: Action, price: u64, at: DateTime<Utc>) -> AuditEvent {
        AuditEvent::new(
            PropertyId::new(property),
            action,
            changes(price),
            Some(UserRef::new("u-1", "Agent", "agent@example.com")),
        )
        .at(at)
    }

    /// A `RiskEngine` that returns the same decision for every event and
    /// counts recorded entries.
    struct FixedEngine {
        decision: RiskDecision,
        recorded: AtomicUsize,
    }

    impl FixedEngine {
        fn clean() -> Self {
            Self {
                decision: RiskDecision::clean(),
                recorded: AtomicUsize::new(0),
            }
        }

        fn flagging() -> Self {
            let mut decision = RiskDecision::clean();
            decision.final_score = 0.85;
            decision.fraud_detected = true;
            decision.factor_scores.insert(RiskFactor::PriceChange, 0.9);
            decision.reasons = vec!["Price changed by 90.0%".to_string()];
            decision.fraud_reason = Some("Price changed by 90.0%".to_string());
            Self {
                decision,
                recorded: AtomicUsize::new(0),
            }
        }
    }

    impl RiskEngine for FixedEngine {
        fn assess(
            &self,
            _event: &AuditEvent,
            _previous: Option<&AuditLogEntry>,
            _store: &dyn AuditStore,
        ) -> LedgerResult<RiskDecision> {
            Ok(self.decision.clone())
        }

        fn entry_recorded(&self, _store: &Arc<dyn AuditStore>) {
            self.recorded.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A store whose backend is down.
    struct OfflineStore;

    fn offline<T>() -> LedgerResult<T> {
        Err(LedgerError::StorageUnavailable {
            reason: "connection refused".to_string(),
        })
    }

    impl AuditStore for OfflineStore {
        fn insert_entry(&self, _entry: &AuditLogEntry) -> LedgerResult<()> {
            offline()
        }
        fn insert_assessment(&self, _assessment: &RiskAssessment) -> LedgerResult<()> {
            offline()
        }
        fn latest_entry(&self, _id: &PropertyId) -> LedgerResult<Option<AuditLogEntry>> {
            offline()
        }
        fn entries_for_property(&self, _id: &PropertyId) -> LedgerResult<Vec<AuditLogEntry>> {
            offline()
        }
        fn recent_entries_by_user(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> LedgerResult<Vec<AuditLogEntry>> {
            offline()
        }
        fn recent_entries(&self, _limit: usize) -> LedgerResult<Vec<AuditLogEntry>> {
            offline()
        }
        fn market_sample(
            &self,
            _location: &str,
            _exclude: &PropertyId,
            _limit: usize,
        ) -> LedgerResult<Vec<PropertySample>> {
            offline()
        }
    }

    fn service_with(engine: FixedEngine) -> (AuditService, InMemoryAuditStore, Arc<FixedEngine>) {
        let store = InMemoryAuditStore::new();
        let engine = Arc::new(engine);
        let service = AuditService::new(Arc::new(store.clone()), engine.clone());
        (service, store, engine)
    }

    fn append_n(service: &AuditService, property: &str, n: u64) -> Vec<AuditLogEntry> {
        (0..n)
            .map(|i| {
                let action = if i == 0 { Action::Create } else { Action::Update };
                let at = t0() + Duration::minutes(i as i64);
                service
                    .append(event(property, action, 100_000 + i * 1_000, at))
                    .unwrap()
            })
            .collect()
    }

    // ── Canonical encoding and digest ─────────────────────────────────────────

    #[test]
    fn test_canonical_encoding_sorts_nested_keys() {
        let mut c = Changes::new();
        c.insert(
            "terms".to_string(),
            serde_json::from_str(r#"{"z":[3,1],"a":{"y":true,"b":null}}"#).unwrap(),
        );
        c.insert("price".to_string(), json!(250000));

        let bytes = encode_changes(&c).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"price":250000,"terms":{"a":{"b":null,"y":true},"z":[3,1]}}"#
        );
    }

    #[test]
    fn test_digest_is_deterministic() {
        let c = changes(120_000);
        let first = digest(&c, Some("ab")).unwrap();
        let second = digest(&c, Some("ab")).unwrap();

        assert_eq!(first, second, "identical inputs must hash identically");
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_is_sensitive_to_every_input() {
        let base = digest(&changes(120_000), None).unwrap();

        assert_ne!(base, digest(&changes(120_001), None).unwrap(), "price change");
        assert_ne!(base, digest(&changes(120_000), Some("")).unwrap(), "absent vs empty prev");
        assert_ne!(
            digest(&changes(120_000), Some("aa")).unwrap(),
            digest(&changes(120_000), Some("ab")).unwrap(),
            "different prev hash"
        );

        let mut nested = changes(120_000);
        nested.insert("terms".to_string(), json!({ "deposit": { "weeks": 4 } }));
        let mut nested_changed = nested.clone();
        nested_changed.insert("terms".to_string(), json!({ "deposit": { "weeks": 5 } }));
        assert_ne!(
            digest(&nested, None).unwrap(),
            digest(&nested_changed, None).unwrap(),
            "nested value change"
        );
    }

    #[test]
    fn test_digest_ignores_nested_key_order() {
        let mut a = Changes::new();
        a.insert(
            "terms".to_string(),
            serde_json::from_str(r#"{"x":1,"y":{"p":1,"q":2}}"#).unwrap(),
        );
        let mut b = Changes::new();
        b.insert(
            "terms".to_string(),
            serde_json::from_str(r#"{"y":{"q":2,"p":1},"x":1}"#).unwrap(),
        );

        assert_eq!(digest(&a, None).unwrap(), digest(&b, None).unwrap());
    }

    // ── Chain linkage and verification ────────────────────────────────────────

    #[test]
    fn test_hash_chain_linkage() {
        let (service, _store, _) = service_with(FixedEngine::clean());
        let entries = append_n(&service, "prop-a", 4);

        assert!(entries[0].prev_hash.is_none(), "first entry has no predecessor");
        for pair in entries.windows(2) {
            assert_eq!(pair[1].prev_hash.as_deref(), Some(pair[0].hash.as_str()));
        }
        for entry in &entries {
            assert_eq!(entry.hash, digest(&entry.changes, entry.prev_hash.as_deref()).unwrap());
        }

        let result = service.verify(&PropertyId::new("prop-a")).unwrap();
        assert!(result.ok);
        assert_eq!(result.entries_checked, 4);
    }

    #[test]
    fn test_chains_are_per_property() {
        let (service, _store, _) = service_with(FixedEngine::clean());
        append_n(&service, "prop-a", 2);
        let b = append_n(&service, "prop-b", 2);

        assert!(b[0].prev_hash.is_none());
        assert!(service.verify(&PropertyId::new("prop-a")).unwrap().ok);
        assert!(service.verify(&PropertyId::new("prop-b")).unwrap().ok);
    }

    /// Mutating a stored entry's changes is reported at that entry's index.
    #[test]
    fn test_tamper_detection() {
        let (service, store, _) = service_with(FixedEngine::clean());
        append_n(&service, "prop-a", 4);
        let property = PropertyId::new("prop-a");

        let tampered = store
            .tamper(&property, 2, |e| {
                e.changes.insert("price".to_string(), json!(1));
            })
            .unwrap();
        assert!(tampered);

        let result = service.verify(&property).unwrap();
        assert!(!result.ok);
        assert_eq!(result.broken_at_index, Some(2));
        assert_eq!(result.reason, Some(ChainBreak::HashMismatch));
    }

    /// Re-hashing a tampered entry only moves the break to its successor.
    #[test]
    fn test_rehashed_tamper_breaks_link() {
        let (service, store, _) = service_with(FixedEngine::clean());
        append_n(&service, "prop-a", 3);
        let property = PropertyId::new("prop-a");

        store
            .tamper(&property, 1, |e| {
                e.changes.insert("price".to_string(), json!(1));
                e.hash = digest(&e.changes, e.prev_hash.as_deref()).unwrap();
            })
            .unwrap();

        let result = service.verify(&property).unwrap();
        assert_eq!(result.broken_at_index, Some(2));
        assert_eq!(result.reason, Some(ChainBreak::LinkMismatch));
    }

    #[test]
    fn test_verify_empty() {
        let result = verify_chain(&[]);
        assert!(result.ok, "empty chain must be valid");
        assert_eq!(result.entries_checked, 0);
        assert!(result.broken_at_index.is_none());
    }

    #[test]
    fn test_history_oldest_first() {
        let (service, _store, _) = service_with(FixedEngine::clean());
        let appended = append_n(&service, "prop-a", 3);

        let history = service.history(&PropertyId::new("prop-a")).unwrap();
        assert_eq!(history, appended);
    }

    // ── Append semantics ──────────────────────────────────────────────────────

    /// A flagged mutation is still recorded, annotated with the reason.
    #[test]
    fn test_flag_does_not_block() {
        let (service, store, _) = service_with(FixedEngine::flagging());
        let entry = service
            .append(event("prop-a", Action::Create, 100_000, t0()))
            .unwrap();

        assert!(entry.fraud_detected);
        assert_eq!(entry.fraud_reason.as_deref(), Some("Price changed by 90.0%"));
        assert_eq!(store.entries().unwrap().len(), 1);

        let assessments = store.assessments().unwrap();
        assert_eq!(assessments.len(), 1);
        assert_eq!(assessments[0].entry_id, entry.id);
        assert_eq!(assessments[0].risk_score, 0.85);
        assert_eq!(assessments[0].risk_factors.get("price_change"), Some(&0.9));
        assert_eq!(assessments[0].user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_assessment_recorded_for_clean_events() {
        let (service, store, engine) = service_with(FixedEngine::clean());
        append_n(&service, "prop-a", 3);

        let assessments = store.assessments().unwrap();
        assert_eq!(assessments.len(), 3, "one assessment per event, flagged or not");
        assert!(assessments.iter().all(|a| a.risk_score == 0.0 && a.reasons.is_empty()));
        assert_eq!(engine.recorded.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_timestamp_never_goes_backwards() {
        let (service, _store, _) = service_with(FixedEngine::clean());
        service
            .append(event("prop-a", Action::Create, 1, t0()))
            .unwrap();
        let late = service
            .append(event("prop-a", Action::Update, 2, t0() - Duration::hours(1)))
            .unwrap();

        assert_eq!(late.timestamp, t0());
    }

    #[test]
    fn test_system_event_without_user() {
        let (service, store, _) = service_with(FixedEngine::clean());
        service
            .append(event("prop-a", Action::Create, 1, t0()))
            .unwrap();
        let mut delete = event("prop-a", Action::Delete, 1, t0());
        delete.user = None;
        delete.changes = Changes::new();

        let entry = service.append(delete).unwrap();
        assert!(entry.user.is_none());
        assert!(store.assessments().unwrap()[1].user_id.is_none());
        assert!(service.verify(&entry.property_id).unwrap().ok);
    }

    #[test]
    fn test_storage_failure_propagates() {
        let service = AuditService::new(Arc::new(OfflineStore), Arc::new(FixedEngine::clean()));
        let result = service.append(event("prop-a", Action::Create, 1, t0()));

        match result {
            Err(LedgerError::StorageUnavailable { reason }) => {
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected StorageUnavailable, got {:?}", other),
        }
    }

    // ── Store ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_store_rejects_stale_prev_hash() {
        let (service, store, _) = service_with(FixedEngine::clean());
        let entries = append_n(&service, "prop-a", 2);

        // A writer that read the chain before entry 1 landed.
        let mut stale = entries[1].clone();
        stale.prev_hash = Some(entries[0].hash.clone());
        stale.hash = "f".repeat(64);

        match store.insert_entry(&stale) {
            Err(LedgerError::ChainConflict { expected, found, .. }) => {
                assert_eq!(expected, Some(entries[0].hash.clone()));
                assert_eq!(found, Some(entries[1].hash.clone()));
            }
            other => panic!("expected ChainConflict, got {:?}", other),
        }
        assert_eq!(store.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_market_sample_follows_mutations() {
        let (service, store, _) = service_with(FixedEngine::clean());
        service
            .append(event("prop-a", Action::Create, 100_000, t0()))
            .unwrap();
        service
            .append(event("prop-b", Action::Create, 300_000, t0()))
            .unwrap();

        let sample = store
            .market_sample("4 Mill Lane, Otley", &PropertyId::new("prop-a"), 10)
            .unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].property_id, PropertyId::new("prop-b"));
        assert_eq!(sample[0].price, 300_000.0);

        let mut delete = event("prop-b", Action::Delete, 0, t0() + Duration::minutes(1));
        delete.changes = Changes::new();
        service.append(delete).unwrap();

        let sample = store
            .market_sample("4 Mill Lane, Otley", &PropertyId::new("prop-a"), 10)
            .unwrap();
        assert!(sample.is_empty(), "deleted property leaves the sample");
    }

    #[test]
    fn test_seeded_market_sample() {
        let store = InMemoryAuditStore::new();
        for (i, price) in [100_000.0, 120_000.0, 140_000.0].into_iter().enumerate() {
            store
                .upsert_property(PropertySample {
                    property_id: PropertyId::new(format!("seed-{i}")),
                    location: "4 Mill Lane, Otley".to_string(),
                    price,
                    updated_at: t0() + Duration::minutes(i as i64),
                })
                .unwrap();
        }

        let sample = store
            .market_sample("4 Mill Lane, Otley", &PropertyId::new("seed-0"), 10)
            .unwrap();
        let ids: Vec<_> = sample.iter().map(|s| s.property_id.as_str()).collect();
        assert_eq!(ids, vec!["seed-2", "seed-1"], "most recently updated first");

        let limited = store
            .market_sample("4 Mill Lane, Otley", &PropertyId::new("other"), 2)
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_recent_entries_newest_first() {
        let (service, store, _) = service_with(FixedEngine::clean());
        append_n(&service, "prop-a", 3);

        let recent = store.recent_entries_by_user("u-1", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp > recent[1].timestamp);
    }

    // ── Concurrency ───────────────────────────────────────────────────────────

    #[test]
    fn test_concurrent_appends_do_not_fork() {
        let (service, store, _) = service_with(FixedEngine::clean());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for i in 0..10u64 {
                        service
                            .append(event("shared", Action::Update, worker * 100 + i, t0()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let property = PropertyId::new("shared");
        let result = service.verify(&property).unwrap();
        assert!(result.ok, "concurrent appends must produce one linear chain");
        assert_eq!(result.entries_checked, 80);

        let roots = store
            .entries()
            .unwrap()
            .iter()
            .filter(|e| e.prev_hash.is_none())
            .count();
        assert_eq!(roots, 1);
        assert_eq!(service.lock_slots(), 0, "lock slot outlived its appends");
    }

    /// Appending to many distinct properties leaves no lock slots behind.
    #[test]
    fn test_lock_registry_stays_bounded() {
        let (service, store, _) = service_with(FixedEngine::clean());

        for i in 0..1000u64 {
            let property = format!("prop-{i}");
            service
                .append(event(&property, Action::Create, 100_000 + i, t0()))
                .unwrap();
        }

        assert_eq!(store.entries().unwrap().len(), 1000);
        assert_eq!(service.lock_slots(), 0, "idle property locks were retained");
    }
}
