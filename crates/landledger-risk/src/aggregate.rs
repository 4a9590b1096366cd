//! Risk aggregation and the fraud decision.
//!
//! `final_score = Σ weight[family] · score[family]` over the families that
//! triggered.  Untriggered families contribute 0 and the weights are never
//! renormalized.  The anomaly score stays advisory unless `ml_weight` is
//! set, in which case the rule sum is scaled by `1 - ml_weight` and the
//! anomaly score fills the remaining share.

use std::collections::BTreeMap;

use landledger_contracts::risk::{CheckOutcome, RiskDecision, RiskFactor};

use crate::config::RiskConfig;

/// Fold family outcomes and the anomaly score into a decision.
pub fn aggregate(
    outcomes: &BTreeMap<RiskFactor, CheckOutcome>,
    ml_score: f64,
    config: &RiskConfig,
) -> RiskDecision {
    let ml_score = if ml_score.is_finite() { ml_score.clamp(0.0, 1.0) } else { 0.0 };

    let mut factor_scores = BTreeMap::new();
    let mut reasons = Vec::new();
    let mut rule_sum = 0.0;

    for (factor, outcome) in outcomes.iter().filter(|(_, o)| o.is_triggered()) {
        rule_sum += config.weights.weight(*factor) * outcome.score;
        factor_scores.insert(*factor, outcome.score);
        if let Some(reason) = &outcome.reason {
            reasons.push(reason.clone());
        }
    }

    let ml_weight = config.weights.ml_weight;
    let final_score = if ml_weight > 0.0 {
        (1.0 - ml_weight) * rule_sum + ml_weight * ml_score
    } else {
        rule_sum
    }
    .clamp(0.0, 1.0);

    let ml_flagged = ml_score > config.model.anomaly_threshold;
    if ml_flagged {
        reasons.push(format!(
            "Anomaly model flagged unusual activity (score {:.2})",
            ml_score
        ));
    }

    let fraud_reason = if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(&config.reason_separator))
    };

    RiskDecision {
        final_score,
        fraud_detected: final_score > config.risk_threshold,
        ml_score,
        ml_flagged,
        factor_scores,
        reasons,
        fraud_reason,
    }
}

/// Each triggered family's weighted share of the final score.
///
/// Scaled by `1 - ml_weight` when the anomaly score is folded in, so the
/// values plus `ml_weight * ml_score` add up to `final_score` before clamping.
pub fn contributions(decision: &RiskDecision, config: &RiskConfig) -> BTreeMap<RiskFactor, f64> {
    let scale = 1.0 - config.weights.ml_weight;
    decision
        .factor_scores
        .iter()
        .map(|(factor, score)| (*factor, scale * config.weights.weight(*factor) * score))
        .collect()
}
