//! # landledger-contracts
//!
//! Shared types, records, and error contracts for the landledger audit core.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod audit;
pub mod error;
pub mod property;
pub mod risk;

#[cfg(test)]
mod tests {
    use super::*;
    use audit::{ChainBreak, VerificationResult};
    use error::LedgerError;
    use property::{price_of, Action, Changes, UserRef};
    use risk::{CheckOutcome, RiskDecision, RiskFactor};

    // ── UserRef ──────────────────────────────────────────────────────────────

    #[test]
    fn user_identity_prefers_id() {
        let user = UserRef::new("u-1", "Ada", "ada@example.com");
        assert_eq!(user.identity(), "u-1");
    }

    #[test]
    fn user_identity_falls_back_to_email() {
        let user = UserRef {
            id: None,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        };
        assert_eq!(user.identity(), "ada@example.com");
    }

    // ── price_of ─────────────────────────────────────────────────────────────

    fn priced(value: serde_json::Value) -> Changes {
        Changes::from([("price".to_string(), value)])
    }

    #[test]
    fn price_reads_numbers_and_numeric_strings() {
        assert_eq!(price_of(&priced(serde_json::json!(250000))), Some(250_000.0));
        assert_eq!(price_of(&priced(serde_json::json!(" 99.5 "))), Some(99.5));
    }

    #[test]
    fn price_rejects_non_numeric_and_non_finite() {
        assert_eq!(price_of(&Changes::new()), None);
        assert_eq!(price_of(&priced(serde_json::json!("call for price"))), None);
        assert_eq!(price_of(&priced(serde_json::json!("inf"))), None);
        assert_eq!(price_of(&priced(serde_json::json!(true))), None);
    }

    // ── Action serde ─────────────────────────────────────────────────────────

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Create).unwrap(), "\"create\"");
        assert_eq!(serde_json::to_string(&Action::Delete).unwrap(), "\"delete\"");
        let decoded: Action = serde_json::from_str("\"update\"").unwrap();
        assert_eq!(decoded, Action::Update);
    }

    // ── RiskFactor ───────────────────────────────────────────────────────────

    #[test]
    fn risk_factor_keys_match_serde_names() {
        for factor in RiskFactor::ALL {
            let json = serde_json::to_string(&factor).unwrap();
            assert_eq!(json, format!("\"{}\"", factor.as_str()));
        }
    }

    // ── CheckOutcome ─────────────────────────────────────────────────────────

    #[test]
    fn check_outcome_max_keeps_higher_score() {
        let low = CheckOutcome::triggered(0.6, "burst");
        let high = CheckOutcome::triggered(0.9, "pattern");

        let merged = low.clone().max(high.clone());
        assert_eq!(merged, high);

        let merged = high.clone().max(low);
        assert_eq!(merged.reason.as_deref(), Some("pattern"));
    }

    #[test]
    fn check_outcome_clamps_score() {
        assert_eq!(CheckOutcome::triggered(1.7, "x").score, 1.0);
        assert!(!CheckOutcome::clear().is_triggered());
    }

    #[test]
    fn clean_decision_has_no_factors() {
        let decision = RiskDecision::clean();
        assert!(!decision.fraud_detected);
        assert_eq!(decision.factor(RiskFactor::PriceChange), 0.0);
        assert!(decision.fraud_reason.is_none());
    }

    // ── VerificationResult ───────────────────────────────────────────────────

    #[test]
    fn verification_result_constructors() {
        let ok = VerificationResult::valid(4);
        assert!(ok.ok);
        assert_eq!(ok.broken_at_index, None);

        let broken = VerificationResult::broken(2, ChainBreak::HashMismatch, 3);
        assert!(!broken.ok);
        assert_eq!(broken.broken_at_index, Some(2));
        assert_eq!(broken.reason, Some(ChainBreak::HashMismatch));
    }

    // ── LedgerError display messages ─────────────────────────────────────────

    #[test]
    fn error_storage_unavailable_display() {
        let err = LedgerError::StorageUnavailable {
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("storage unavailable"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn error_chain_conflict_display() {
        let err = LedgerError::ChainConflict {
            property_id: "prop-7".to_string(),
            expected: Some("aa".to_string()),
            found: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("prop-7"));
        assert!(msg.contains("chain conflict"));
    }

    #[test]
    fn error_config_error_display() {
        let err = LedgerError::ConfigError {
            reason: "weights sum to 0.9".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("weights sum to 0.9"));
    }
}
