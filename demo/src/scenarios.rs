//! Scripted scenarios for the demo CLI.
//!
//! Each scenario builds a fresh in-memory store and engine, warms the store
//! with unremarkable neighbourhood activity so the anomaly model has a
//! snapshot, then replays its own events through `AuditService::append`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use landledger_audit::{AuditService, InMemoryAuditStore};
use landledger_contracts::{
    audit::{AuditLogEntry, RiskAssessment, VerificationResult},
    error::{LedgerError, LedgerResult},
    property::{Action, AuditEvent, Changes, PropertyId, UserRef},
    risk::{RiskDecision, RiskFactor},
};
use landledger_risk::{contributions, HybridRiskEngine, RiskConfig};

/// Built-in configuration: default thresholds, model trained inline so runs
/// are reproducible.
pub fn demo_config() -> RiskConfig {
    let mut config = RiskConfig::default();
    config.model.background = false;
    config
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// One appended event and the assessment recorded with it.
#[derive(Debug, Clone)]
pub struct Step {
    pub entry: AuditLogEntry,
    pub assessment: RiskAssessment,
}

impl Step {
    pub fn factor(&self, factor: RiskFactor) -> f64 {
        self.assessment
            .risk_factors
            .get(factor.as_str())
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub steps: Vec<Step>,
    pub verifications: Vec<(PropertyId, VerificationResult)>,
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    config: RiskConfig,
    store: InMemoryAuditStore,
    engine: Arc<HybridRiskEngine>,
    service: AuditService,
    base: DateTime<Utc>,
}

impl Harness {
    fn new(config: &RiskConfig) -> LedgerResult<Self> {
        let store = InMemoryAuditStore::new();
        let engine = Arc::new(HybridRiskEngine::new(config.clone())?);
        let service = AuditService::new(Arc::new(store.clone()), engine.clone());
        Ok(Self {
            config: config.clone(),
            store,
            engine,
            service,
            base: Utc::now(),
        })
    }

    /// Append `count` ordinary listings by distinct agents, an hour apart,
    /// ending a month before the scenario starts.
    fn warm_up(&self, count: usize) -> LedgerResult<()> {
        const STREETS: [&str; 3] = [
            "21 Wharf Street, Riverside",
            "8 Orchard Close, Riverside",
            "33 Canal Row, Riverside",
        ];
        let start = self.base - Duration::days(30) - Duration::hours(count as i64);

        for i in 0..count {
            let agent = UserRef::new(
                format!("agent-{:02}", i),
                format!("Agent {}", i),
                format!("agent{}@example.com", i),
            );
            let changes = listing(
                STREETS[i % STREETS.len()],
                240_000 + 2_500 * (i % 7) as u64,
                "Leasehold, 120 years remaining, no onward chain.",
                Some("sale"),
            );
            let event = AuditEvent::new(
                PropertyId::new(format!("riverside-{:02}", i)),
                Action::Create,
                changes,
                Some(agent),
            )
            .at(start + Duration::hours(i as i64));
            self.service.append(event)?;
        }

        match self.engine.models().snapshot() {
            Some(snapshot) => println!(
                "  Neighbourhood history: {} listings, anomaly model v{} on {} samples",
                count, snapshot.version, snapshot.sample_count
            ),
            None => println!(
                "  Neighbourhood history: {} listings, anomaly model not trained yet",
                count
            ),
        }
        println!();
        Ok(())
    }

    fn record(&self, event: AuditEvent) -> LedgerResult<Step> {
        let entry = self.service.append(event)?;
        let assessment = self
            .store
            .assessments()?
            .into_iter()
            .rev()
            .find(|a| a.entry_id == entry.id)
            .ok_or_else(|| LedgerError::StorageUnavailable {
                reason: format!("no risk assessment stored for entry {}", entry.id),
            })?;
        Ok(Step { entry, assessment })
    }

    fn verify(&self, property_id: &PropertyId) -> LedgerResult<(PropertyId, VerificationResult)> {
        let result = self.service.verify(property_id)?;
        print_verification(property_id, &result);
        Ok((property_id.clone(), result))
    }

    fn at(&self, offset: Duration) -> DateTime<Utc> {
        self.base + offset
    }
}

const WARM_UP_LISTINGS: usize = 24;

fn listing(location: &str, price: u64, terms: &str, buyer_intent: Option<&str>) -> Changes {
    let mut changes = Changes::new();
    changes.insert("location".to_string(), json!(location));
    changes.insert("price".to_string(), json!(price));
    changes.insert("terms".to_string(), json!(terms));
    if let Some(intent) = buyer_intent {
        changes.insert("buyer_intent".to_string(), json!(intent));
    }
    changes
}

fn seller() -> UserRef {
    UserRef::new("u-morag", "Morag Innes", "morag@example.com")
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

pub fn run_all(config: &RiskConfig) -> LedgerResult<()> {
    price_spike(config)?;
    burst_updates(config)?;
    suspicious_terms(config)?;
    tamper(config)?;
    Ok(())
}

/// A listing re-priced from 100,000 to 160,000 three days after creation.
pub fn price_spike(config: &RiskConfig) -> LedgerResult<ScenarioReport> {
    println!("=== Scenario: Price spike ===");
    println!();
    info!(scenario = "price-spike", "running scenario");

    let h = Harness::new(config)?;
    h.warm_up(WARM_UP_LISTINGS)?;

    let property = PropertyId::new("castle-wynd-7");
    let location = "7 Castle Wynd, Old Town";
    let terms = "Freehold, vacant possession on completion.";
    let mut report = ScenarioReport::default();

    for (offset, action, price) in [
        (Duration::zero(), Action::Create, 100_000),
        (Duration::days(3), Action::Update, 160_000),
    ] {
        let event = AuditEvent::new(
            property.clone(),
            action,
            listing(location, price, terms, Some("sale")),
            Some(seller()),
        )
        .at(h.at(offset));
        let step = h.record(event)?;
        print_step(&format!("{} at {}", action, price), &step, &h.config);
        report.steps.push(step);
    }

    report.verifications.push(h.verify(&property)?);
    Ok(report)
}

/// One seller updating the same listing three times, 30 seconds apart.
pub fn burst_updates(config: &RiskConfig) -> LedgerResult<ScenarioReport> {
    println!("=== Scenario: Burst updates ===");
    println!();
    info!(scenario = "burst-updates", "running scenario");

    let h = Harness::new(config)?;
    h.warm_up(WARM_UP_LISTINGS)?;

    let property = PropertyId::new("quayside-3");
    let mut report = ScenarioReport::default();

    for i in 0..3u64 {
        let action = if i == 0 { Action::Create } else { Action::Update };
        let event = AuditEvent::new(
            property.clone(),
            action,
            listing(
                "3 Quayside, Harbour",
                185_000,
                &format!("Freehold, offers over asking considered. Revision {}.", i + 1),
                Some("sale"),
            ),
            Some(seller()),
        )
        .at(h.at(Duration::seconds(30 * i as i64)));
        let step = h.record(event)?;
        print_step(&format!("{} #{}", action, i + 1), &step, &h.config);
        report.steps.push(step);
    }

    report.verifications.push(h.verify(&property)?);
    Ok(report)
}

/// Content checks: payment-only terms, then a listing without buyer intent.
pub fn suspicious_terms(config: &RiskConfig) -> LedgerResult<ScenarioReport> {
    println!("=== Scenario: Suspicious terms & missing fields ===");
    println!();
    info!(scenario = "suspicious-terms", "running scenario");

    let h = Harness::new(config)?;
    h.warm_up(WARM_UP_LISTINGS)?;

    let wire = PropertyId::new("mill-row-12");
    let incomplete = PropertyId::new("mill-row-14");
    let mut report = ScenarioReport::default();

    let events = [
        (
            &wire,
            listing("12 Mill Row, Eastfield", 210_000, "Pay via wire transfer only", Some("sale")),
            Duration::zero(),
            "terms demand wire transfer",
        ),
        (
            &incomplete,
            listing(
                "14 Mill Row, Eastfield",
                215_000,
                "Freehold, completion within eight weeks.",
                None,
            ),
            Duration::days(1),
            "buyer_intent omitted",
        ),
    ];

    for (property, changes, offset, label) in events {
        let event = AuditEvent::new(property.clone(), Action::Create, changes, Some(seller()))
            .at(h.at(offset));
        let step = h.record(event)?;
        print_step(label, &step, &h.config);
        report.steps.push(step);
    }

    report.verifications.push(h.verify(&wire)?);
    report.verifications.push(h.verify(&incomplete)?);
    Ok(report)
}

/// Rewrite a stored entry's price behind the service's back and verify.
pub fn tamper(config: &RiskConfig) -> LedgerResult<ScenarioReport> {
    println!("=== Scenario: Tamper detection ===");
    println!();
    info!(scenario = "tamper", "running scenario");

    let h = Harness::new(config)?;
    let property = PropertyId::new("high-street-40");
    let mut report = ScenarioReport::default();

    for (i, price) in [320_000u64, 315_000, 310_000].into_iter().enumerate() {
        let action = if i == 0 { Action::Create } else { Action::Update };
        let event = AuditEvent::new(
            property.clone(),
            action,
            listing(
                "40 High Street, Northgate",
                price,
                "Freehold, no onward chain, viewing by appointment.",
                Some("sale"),
            ),
            Some(seller()),
        )
        .at(h.at(Duration::days(7 * i as i64)));
        report.steps.push(h.record(event)?);
    }
    println!("  Recorded {} entries for {}.", report.steps.len(), property);
    report.verifications.push(h.verify(&property)?);

    println!("  Rewriting entry 1 price to 150000 directly in storage...");
    h.store.tamper(&property, 1, |entry| {
        entry.changes.insert("price".to_string(), json!(150_000));
    })?;
    report.verifications.push(h.verify(&property)?);
    println!();
    Ok(report)
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_step(label: &str, step: &Step, config: &RiskConfig) {
    let entry = &step.entry;
    let assessment = &step.assessment;
    let short = |hash: &str| hash.get(..12).unwrap_or(hash).to_string();

    println!("  Event:        {} — {}", entry.property_id, label);
    println!(
        "  Risk score:   {:.3} (threshold {:.2})  fraud flag: {}",
        assessment.risk_score,
        config.risk_threshold,
        if entry.fraud_detected { "YES" } else { "no" }
    );
    println!("  ML score:     {:.3}", assessment.ml_score);

    for (factor, (score, share)) in weighted_factors(assessment, config) {
        println!("    {:<18} {:.2} → {:.3}", factor.as_str(), score, share);
    }
    for reason in &assessment.reasons {
        println!("    - {}", reason);
    }
    println!(
        "  Hash:         {}…  prev: {}",
        short(&entry.hash),
        entry.prev_hash.as_deref().map(short).unwrap_or_else(|| "—".to_string())
    );
    println!();
}

/// Each recorded factor's score and its weighted share of the risk score.
fn weighted_factors(
    assessment: &RiskAssessment,
    config: &RiskConfig,
) -> BTreeMap<RiskFactor, (f64, f64)> {
    let recorded = RiskDecision {
        factor_scores: RiskFactor::ALL
            .into_iter()
            .filter_map(|factor| {
                let score = assessment.risk_factors.get(factor.as_str())?;
                Some((factor, *score))
            })
            .collect(),
        ..RiskDecision::clean()
    };
    contributions(&recorded, config)
        .into_iter()
        .map(|(factor, share)| (factor, (recorded.factor(factor), share)))
        .collect()
}

fn print_verification(property_id: &PropertyId, result: &VerificationResult) {
    match (result.ok, result.broken_at_index) {
        (true, _) => println!(
            "  Audit chain for {}: VERIFIED ({} entries)",
            property_id, result.entries_checked
        ),
        (false, index) => println!(
            "  Audit chain for {}: BROKEN at index {} ({:?})",
            property_id,
            index.map_or_else(|| "?".to_string(), |i| i.to_string()),
            result.reason
        ),
    }
    println!();
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use landledger_contracts::audit::ChainBreak;

    use super::*;

    #[test]
    fn test_warm_up_trains_model() {
        let h = Harness::new(&demo_config()).unwrap();
        h.warm_up(WARM_UP_LISTINGS).unwrap();

        let snapshot = h.engine.models().snapshot().expect("model trained from warm-up");
        assert!(snapshot.sample_count >= 16);
        assert_eq!(h.store.entries().unwrap().len(), WARM_UP_LISTINGS);
    }

    #[test]
    fn test_price_spike_end_to_end() {
        let report = price_spike(&demo_config()).unwrap();
        let spike = &report.steps[1];

        assert_eq!(spike.factor(RiskFactor::PriceChange), 0.7);
        assert!(
            spike.assessment.reasons.iter().any(|r| r.contains("60.0%")),
            "reasons: {:?}",
            spike.assessment.reasons
        );
        assert!(!spike.entry.fraud_detected, "0.21 stays below the 0.7 threshold");
        assert_eq!(spike.entry.prev_hash.as_deref(), Some(report.steps[0].entry.hash.as_str()));
        assert!(report.verifications[0].1.ok);
    }

    #[test]
    fn test_weighted_factors_add_up_to_risk_score() {
        let config = demo_config();
        let report = price_spike(&config).unwrap();
        let spike = &report.steps[1];

        let shares = weighted_factors(&spike.assessment, &config);
        let (score, share) = shares[&RiskFactor::PriceChange];
        assert_eq!(score, 0.7);
        assert!((share - 0.21).abs() < 1e-9, "price share {share}");

        let total: f64 = shares.values().map(|(_, share)| share).sum();
        assert!(
            (total - spike.assessment.risk_score).abs() < 1e-9,
            "shares {total} vs risk score {}",
            spike.assessment.risk_score
        );
    }

    #[test]
    fn test_burst_updates_end_to_end() {
        let report = burst_updates(&demo_config()).unwrap();
        let third = &report.steps[2];

        assert_eq!(third.factor(RiskFactor::UpdateFrequency), 0.9);
        assert_eq!(report.steps[1].factor(RiskFactor::UpdateFrequency), 0.6);
        assert!(report.verifications[0].1.ok);
    }

    #[test]
    fn test_suspicious_terms_end_to_end() {
        let report = suspicious_terms(&demo_config()).unwrap();

        let wire = &report.steps[0];
        assert_eq!(wire.factor(RiskFactor::PatternMatch), 0.7);
        assert!(wire.assessment.reasons.iter().any(|r| r.contains("terms")));

        let incomplete = &report.steps[1];
        assert_eq!(incomplete.factor(RiskFactor::DataConsistency), 0.6);
        assert!(incomplete
            .assessment
            .reasons
            .iter()
            .any(|r| r.contains("buyer_intent")));
    }

    #[test]
    fn test_tamper_end_to_end() {
        let report = tamper(&demo_config()).unwrap();

        let (_, before) = &report.verifications[0];
        assert!(before.ok);

        let (_, after) = &report.verifications[1];
        assert!(!after.ok);
        assert_eq!(after.broken_at_index, Some(1));
        assert_eq!(after.reason, Some(ChainBreak::HashMismatch));
    }

    #[test]
    fn test_run_all() {
        run_all(&demo_config()).unwrap();
    }
}
