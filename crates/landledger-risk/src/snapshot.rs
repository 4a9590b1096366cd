//! Versioned anomaly-model snapshots and the retrain policy.
//!
//! The per-event path only ever reads an `Arc<ModelSnapshot>`; training
//! builds a fresh snapshot off to the side and swaps it in.  A scoring call
//! never waits on a fit unless the engine is configured for inline training.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use landledger_contracts::error::LedgerResult;
use landledger_core::traits::AuditStore;

use crate::{
    anomaly::{squash, IsolationForest, StandardScaler},
    config::{ModelConfig, RiskConfig},
    features::{training_features, FeatureVector},
    rules::PatternSet,
};

/// An immutable, fitted model.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub sample_count: usize,
    scaler: StandardScaler,
    forest: IsolationForest,
}

impl ModelSnapshot {
    /// Anomaly probability in [0, 1] for one feature vector.
    pub fn score(&self, features: &FeatureVector, config: &ModelConfig) -> f64 {
        let point = self.scaler.transform(features);
        squash(self.forest.score(&point), config.squash_steepness)
    }
}

/// Holds the current snapshot and the counters behind the retrain policy.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    versions: AtomicU64,
    since_attempt: AtomicUsize,
    attempted: AtomicBool,
    training: AtomicBool,
}

/// Clears the registry's training flag when a fit finishes or unwinds.
pub struct TrainingPermit<'a> {
    registry: &'a ModelRegistry,
}

impl Drop for TrainingPermit<'_> {
    fn drop(&mut self) {
        self.registry.training.store(false, Ordering::Release);
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot scoring should use right now, if any.
    pub fn snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn install(&self, snapshot: Arc<ModelSnapshot>) {
        info!(
            version = snapshot.version,
            samples = snapshot.sample_count,
            "installing anomaly model snapshot"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Count one recorded entry and report whether a training run is due.
    ///
    /// With no snapshot yet, the first recorded entry is due and afterwards
    /// every `min_training_samples` entries until a fit succeeds.  With a
    /// snapshot, every `retrain_every` entries (never when 0).
    pub fn record_append(&self, config: &ModelConfig) -> bool {
        let since = self.since_attempt.fetch_add(1, Ordering::AcqRel) + 1;
        let has_model = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();

        if has_model {
            config.retrain_every > 0 && since >= config.retrain_every
        } else {
            !self.attempted.load(Ordering::Acquire) || since >= config.min_training_samples
        }
    }

    /// Claim the right to train.  `None` while another fit is running.
    pub fn try_begin_training(&self) -> Option<TrainingPermit<'_>> {
        self.training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TrainingPermit { registry: self })
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    /// Fit a new snapshot from the most recent stored entries and install it.
    ///
    /// Returns `Ok(None)` when there is not yet enough history to fit.
    pub fn train(
        &self,
        _permit: &TrainingPermit<'_>,
        store: &dyn AuditStore,
        patterns: &PatternSet,
        config: &RiskConfig,
    ) -> LedgerResult<Option<Arc<ModelSnapshot>>> {
        self.attempted.store(true, Ordering::Release);
        self.since_attempt.store(0, Ordering::Release);

        let entries = store.recent_entries(config.model.training_window)?;
        let samples = training_features(&entries, patterns, config);
        if samples.len() < config.model.min_training_samples {
            debug!(
                samples = samples.len(),
                required = config.model.min_training_samples,
                "not enough history to train anomaly model"
            );
            return Ok(None);
        }

        let scaler = StandardScaler::fit(&samples)?;
        let points: Vec<_> = samples.iter().map(|s| scaler.transform(s)).collect();
        let version = self.versions.fetch_add(1, Ordering::AcqRel) + 1;
        let forest = IsolationForest::fit(
            &points,
            config.model.trees,
            config.model.subsample,
            config.model.seed.wrapping_add(version),
        )?;

        let snapshot = Arc::new(ModelSnapshot {
            version,
            trained_at: Utc::now(),
            sample_count: samples.len(),
            scaler,
            forest,
        });
        self.install(Arc::clone(&snapshot));
        Ok(Some(snapshot))
    }
}
