//! Risk factor and decision types.
//!
//! Each rule-check family produces a `CheckOutcome`.  The aggregator folds
//! the outcomes and the anomaly score into a `RiskDecision`, which the audit
//! service stamps onto the entry and persists as a `RiskAssessment`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The five independent rule-check families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    PriceChange,
    UpdateFrequency,
    PatternMatch,
    DataConsistency,
    UserBehavior,
}

impl RiskFactor {
    /// All families in evaluation order.
    pub const ALL: [RiskFactor; 5] = [
        RiskFactor::PriceChange,
        RiskFactor::UpdateFrequency,
        RiskFactor::PatternMatch,
        RiskFactor::DataConsistency,
        RiskFactor::UserBehavior,
    ];

    /// Key used in `RiskAssessment::risk_factors`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::PriceChange => "price_change",
            RiskFactor::UpdateFrequency => "update_frequency",
            RiskFactor::PatternMatch => "pattern_match",
            RiskFactor::DataConsistency => "data_consistency",
            RiskFactor::UserBehavior => "user_behavior",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key recorded for the anomaly model's signal when it fires.
pub const ML_DETECTION_FACTOR: &str = "ml_detection";

/// The result of one rule-check family: a bounded score and, when the
/// family triggered, a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// In [0, 1]; 0 means the family did not trigger.
    pub score: f64,
    pub reason: Option<String>,
}

impl CheckOutcome {
    pub fn clear() -> Self {
        Self { score: 0.0, reason: None }
    }

    pub fn triggered(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            reason: Some(reason.into()),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.score > 0.0
    }

    /// Keep whichever outcome scores higher.  Families take the max of their
    /// sub-checks, never the sum.
    pub fn max(self, other: CheckOutcome) -> CheckOutcome {
        if other.score > self.score {
            other
        } else {
            self
        }
    }
}

/// The aggregated verdict for one audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Weighted score in [0, 1].
    pub final_score: f64,
    pub fraud_detected: bool,
    /// Anomaly-model score in [0, 1].
    pub ml_score: f64,
    /// Whether `ml_score` crossed the anomaly threshold.
    pub ml_flagged: bool,
    /// Score of every family that triggered.
    pub factor_scores: BTreeMap<RiskFactor, f64>,
    /// Triggered reasons in evaluation order, the anomaly reason last.
    pub reasons: Vec<String>,
    /// `reasons` joined with the configured separator, or `None` when empty.
    pub fraud_reason: Option<String>,
}

impl RiskDecision {
    /// A decision with nothing triggered.
    pub fn clean() -> Self {
        Self {
            final_score: 0.0,
            fraud_detected: false,
            ml_score: 0.0,
            ml_flagged: false,
            factor_scores: BTreeMap::new(),
            reasons: Vec::new(),
            fraud_reason: None,
        }
    }

    pub fn factor(&self, factor: RiskFactor) -> f64 {
        self.factor_scores.get(&factor).copied().unwrap_or(0.0)
    }

    /// Factor name → score as persisted in a `RiskAssessment`, including
    /// `ml_detection` when the anomaly model fired.
    pub fn risk_factors(&self) -> BTreeMap<String, f64> {
        let mut factors: BTreeMap<String, f64> = self
            .factor_scores
            .iter()
            .map(|(factor, score)| (factor.as_str().to_string(), *score))
            .collect();
        if self.ml_flagged {
            factors.insert(ML_DETECTION_FACTOR.to_string(), self.ml_score);
        }
        factors
    }
}
