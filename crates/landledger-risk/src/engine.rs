//! Hybrid rule + anomaly-model risk engine.
//!
//! `HybridRiskEngine` implements the `RiskEngine` trait from landledger-core.
//!
//! Assessment algorithm:
//!
//! 1. Gather the history context (the only storage reads).
//! 2. In parallel over that context: run the five rule families, and build
//!    the feature vector and score it against the current model snapshot.
//! 3. Aggregate into a `RiskDecision`.
//!
//! The model is never allowed to fail an assessment: no snapshot, a
//! training error, or a panicked scorer all degrade to an anomaly score of 0.
//! Retraining after an append is likewise contained: a failed or panicked fit
//! is logged and the previous snapshot stays in place.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use landledger_contracts::{
    audit::AuditLogEntry,
    error::LedgerResult,
    property::AuditEvent,
    risk::RiskDecision,
};
use landledger_core::traits::{AuditStore, RiskEngine};

use crate::{
    aggregate::aggregate,
    config::RiskConfig,
    context::HistoryContext,
    features::event_features,
    rules::RuleChecks,
    snapshot::{ModelRegistry, ModelSnapshot},
};

/// The production `RiskEngine`.
///
/// Construct once with its configuration and share by handle; it holds no
/// per-request state.
///
/// ```rust,ignore
/// use landledger_risk::{HybridRiskEngine, RiskConfig};
///
/// let engine = HybridRiskEngine::new(RiskConfig::from_file(Path::new("risk.toml"))?)?;
/// ```
#[derive(Debug, Clone)]
pub struct HybridRiskEngine {
    config: Arc<RiskConfig>,
    checks: Arc<RuleChecks>,
    models: Arc<ModelRegistry>,
}

impl HybridRiskEngine {
    /// Validate `config` and compile the pattern set.
    pub fn new(config: RiskConfig) -> LedgerResult<Self> {
        config.validate()?;
        let checks = RuleChecks::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            checks: Arc::new(checks),
            models: Arc::new(ModelRegistry::new()),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Train synchronously from the store's recent history.
    ///
    /// Returns `Ok(None)` when another fit is already running or there is not
    /// yet enough history.
    pub fn retrain_now(&self, store: &dyn AuditStore) -> LedgerResult<Option<Arc<ModelSnapshot>>> {
        match self.models.try_begin_training() {
            Some(permit) => self.models.train(&permit, store, self.checks.patterns(), &self.config),
            None => Ok(None),
        }
    }

    /// Anomaly score for `event`, degrading to 0 without a usable model.
    fn anomaly_score(
        &self,
        event: &AuditEvent,
        ctx: &HistoryContext,
        store: &dyn AuditStore,
    ) -> f64 {
        let snapshot = match self.models.snapshot() {
            Some(snapshot) => Some(snapshot),
            None if !self.config.model.background => match self.retrain_now(store) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "inline anomaly model training failed");
                    None
                }
            },
            None => None,
        };

        let Some(snapshot) = snapshot else {
            debug!(property_id = %event.property_id, "no anomaly model; rule-only scoring");
            return 0.0;
        };

        let features = event_features(event, ctx, self.checks.patterns(), &self.config);
        let score = snapshot.score(&features, &self.config.model);
        debug!(
            property_id = %event.property_id,
            model_version = snapshot.version,
            score,
            "anomaly model scored event"
        );
        score
    }

    fn spawn_retrain(&self, store: Arc<dyn AuditStore>) {
        let engine = self.clone();
        let spawned = thread::Builder::new()
            .name("landledger-retrain".to_string())
            .spawn(move || {
                let Some(permit) = engine.models.try_begin_training() else {
                    return;
                };
                let fitted = panic::catch_unwind(AssertUnwindSafe(|| {
                    engine.models.train(
                        &permit,
                        store.as_ref(),
                        engine.checks.patterns(),
                        &engine.config,
                    )
                }));
                match fitted {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "background anomaly model training failed"),
                    Err(_) => warn!("background anomaly model training panicked"),
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not spawn anomaly model training thread");
        }
    }
}

impl RiskEngine for HybridRiskEngine {
    fn assess(
        &self,
        event: &AuditEvent,
        previous: Option<&AuditLogEntry>,
        store: &dyn AuditStore,
    ) -> LedgerResult<RiskDecision> {
        let ctx = HistoryContext::gather(event, previous, store, &self.config)?;

        let (outcomes, ml_score) = thread::scope(|scope| {
            let model = scope.spawn(|| self.anomaly_score(event, &ctx, store));
            let outcomes = self.checks.evaluate(event, &ctx, &self.config);
            let ml_score = model.join().unwrap_or_else(|_| {
                warn!(property_id = %event.property_id, "anomaly scorer panicked; using 0");
                0.0
            });
            (outcomes, ml_score)
        });

        let decision = aggregate(&outcomes, ml_score, &self.config);
        debug!(
            property_id = %event.property_id,
            final_score = decision.final_score,
            ml_score = decision.ml_score,
            fraud_detected = decision.fraud_detected,
            "risk assessed"
        );
        Ok(decision)
    }

    fn entry_recorded(&self, store: &Arc<dyn AuditStore>) {
        if !self.models.record_append(&self.config.model) || self.models.is_training() {
            return;
        }

        if self.config.model.background {
            self.spawn_retrain(Arc::clone(store));
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.retrain_now(store.as_ref()))) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "anomaly model retraining failed"),
            Err(_) => warn!("anomaly model retraining panicked; keeping previous snapshot"),
        }
    }
}
