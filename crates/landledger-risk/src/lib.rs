//! # landledger-risk
//!
//! Fraud and risk scoring for property mutations.
//!
//! ## Overview
//!
//! This crate provides [`HybridRiskEngine`], which implements the
//! [`RiskEngine`](landledger_core::traits::RiskEngine) trait.  Each event is
//! scored two ways over the same history context:
//!
//! 1. **Rules** — five independent check families (price change, update
//!    frequency, pattern match, data consistency, user behavior), each a
//!    bounded score plus reason.
//! 2. **Anomaly model** — an isolation forest over standardized feature
//!    vectors, trained from recent audit history into swappable snapshots.
//!
//! The aggregator weights the rule families into a final score and flags
//! fraud above the configured threshold.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use landledger_risk::{HybridRiskEngine, RiskConfig};
//!
//! let config = RiskConfig::from_file(Path::new("config/risk.toml"))?;
//! let engine = HybridRiskEngine::new(config)?;
//! // Pass `engine` to `landledger_audit::AuditService::new(...)`.
//! ```

pub mod aggregate;
pub mod anomaly;
pub mod config;
pub mod context;
pub mod engine;
pub mod features;
pub mod rules;
pub mod snapshot;

pub use aggregate::{aggregate, contributions};
pub use config::RiskConfig;
pub use engine::HybridRiskEngine;
pub use snapshot::{ModelRegistry, ModelSnapshot};

// ── Tests ─────────────────────────────────────────────────────────────────────
