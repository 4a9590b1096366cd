//! Risk configuration schema.
//!
//! `RiskConfig` is deserialized from TOML.  Every section and field has a
//! default, so a file only needs to list what it overrides:
//!
//! ```toml
//! risk_threshold = 0.65
//!
//! [price]
//! change_threshold = 0.4
//!
//! [model]
//! background = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use landledger_contracts::{
    error::{LedgerError, LedgerResult},
    risk::RiskFactor,
};

/// Top-level risk configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// `final_score` above this flags the event as fraud.
    pub risk_threshold: f64,
    /// Joins triggered reasons into `fraud_reason`.
    pub reason_separator: String,
    pub weights: WeightConfig,
    pub price: PriceConfig,
    pub frequency: FrequencyConfig,
    pub pattern: PatternConfig,
    pub consistency: ConsistencyConfig,
    pub behavior: BehaviorConfig,
    pub model: ModelConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.7,
            reason_separator: "; ".to_string(),
            weights: WeightConfig::default(),
            price: PriceConfig::default(),
            frequency: FrequencyConfig::default(),
            pattern: PatternConfig::default(),
            consistency: ConsistencyConfig::default(),
            behavior: BehaviorConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

/// Per-family weights.  The five rule weights must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub price_change: f64,
    pub update_frequency: f64,
    pub pattern_match: f64,
    pub data_consistency: f64,
    pub user_behavior: f64,
    /// Share given to the anomaly score.  0 keeps it advisory-only; a
    /// positive value scales the rule sum by `1 - ml_weight` and adds
    /// `ml_weight * ml_score`.
    pub ml_weight: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            price_change: 0.30,
            update_frequency: 0.20,
            pattern_match: 0.20,
            data_consistency: 0.15,
            user_behavior: 0.15,
            ml_weight: 0.0,
        }
    }
}

impl WeightConfig {
    pub fn weight(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::PriceChange => self.price_change,
            RiskFactor::UpdateFrequency => self.update_frequency,
            RiskFactor::PatternMatch => self.pattern_match,
            RiskFactor::DataConsistency => self.data_consistency,
            RiskFactor::UserBehavior => self.user_behavior,
        }
    }

    pub fn rule_total(&self) -> f64 {
        RiskFactor::ALL.iter().map(|f| self.weight(*f)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// How many same-location properties form the market average.
    pub market_sample_size: usize,
    /// Relative deviation from the market average that triggers.
    pub market_deviation: f64,
    pub market_score: f64,
    /// Relative change against the previous price that triggers when the
    /// market check did not.
    pub change_threshold: f64,
    pub change_score: f64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            market_sample_size: 10,
            market_deviation: 0.30,
            market_score: 0.8,
            change_threshold: 0.50,
            change_score: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    pub burst_window_secs: i64,
    pub burst_score: f64,
    /// How many of the actor's recent entries are counted.
    pub volume_window: usize,
    pub volume_threshold: usize,
    pub volume_score: f64,
    pub pattern_gap_secs: i64,
    pub pattern_min_updates: usize,
    pub pattern_score: f64,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            burst_window_secs: 300,
            burst_score: 0.6,
            volume_window: 20,
            volume_threshold: 5,
            volume_score: 0.8,
            pattern_gap_secs: 60,
            pattern_min_updates: 3,
            pattern_score: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub score: f64,
    /// Text fields scanned for suspicious content.
    pub fields: Vec<String>,
    pub marketing_keywords: Vec<String>,
    pub payment_phrases: Vec<String>,
    pub guarantee_phrases: Vec<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            score: 0.7,
            fields: vec!["location".to_string(), "terms".to_string()],
            marketing_keywords: ["free", "cheap", "discount", "urgent"]
                .into_iter()
                .map(String::from)
                .collect(),
            payment_phrases: ["wire transfer", "western union", "money order"]
                .into_iter()
                .map(String::from)
                .collect(),
            guarantee_phrases: [
                "guaranteed",
                "guarantee",
                "100% safe",
                "risk free",
                "confidential",
                "no questions asked",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub required_fields: Vec<String>,
    pub missing_score: f64,
    pub terms_min_len: usize,
    pub terms_max_len: usize,
    pub location_min_len: usize,
    pub location_max_len: usize,
    pub length_score: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            required_fields: vec![
                "location".to_string(),
                "buyer_intent".to_string(),
                "terms".to_string(),
            ],
            missing_score: 0.6,
            terms_min_len: 10,
            terms_max_len: 1000,
            location_min_len: 5,
            location_max_len: 200,
            length_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// How many of the actor's recent entries are inspected.
    pub history_window: usize,
    /// Managing more distinct properties than this triggers.
    pub max_properties: usize,
    pub breadth_score: f64,
    pub timing_gap_secs: i64,
    pub timing_min_updates: usize,
    pub timing_score: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            history_window: 50,
            max_properties: 5,
            breadth_score: 0.6,
            timing_gap_secs: 300,
            timing_min_updates: 3,
            timing_score: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Most recent audit entries used as training data.
    pub training_window: usize,
    /// Below this many feature vectors no model is fitted.
    pub min_training_samples: usize,
    pub trees: usize,
    pub subsample: usize,
    pub seed: u64,
    /// Slope of the logistic squash around the 0.5 isolation-score midpoint.
    pub squash_steepness: f64,
    /// Anomaly probability above this is a positive signal.
    pub anomaly_threshold: f64,
    /// Retrain after this many recorded entries.  0 disables retraining
    /// after the first snapshot.
    pub retrain_every: usize,
    /// Train on a background thread instead of inline on the append path.
    pub background: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            training_window: 1000,
            min_training_samples: 16,
            trees: 100,
            subsample: 256,
            seed: 0x5eed_1a4d,
            squash_steepness: 10.0,
            anomaly_threshold: 0.7,
            retrain_every: 100,
            background: true,
        }
    }
}

impl RiskConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `LedgerError::ConfigError` if the TOML is malformed, does not
    /// match the schema, or fails `validate`.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: RiskConfig = toml::from_str(s).map_err(|e| LedgerError::ConfigError {
            reason: format!("failed to parse risk config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML risk configuration.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::ConfigError {
            reason: format!("failed to read risk config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject configurations the aggregator cannot honor.
    pub fn validate(&self) -> LedgerResult<()> {
        let total = self.weights.rule_total();
        if (total - 1.0).abs() > 1e-6 {
            return Err(config_error(format!(
                "rule weights must sum to 1.0, got {:.4}",
                total
            )));
        }
        if !(0.0..1.0).contains(&self.weights.ml_weight) {
            return Err(config_error(format!(
                "ml_weight must be in [0, 1), got {}",
                self.weights.ml_weight
            )));
        }

        let bounded = [
            ("risk_threshold", self.risk_threshold),
            ("price.market_deviation", self.price.market_deviation),
            ("price.market_score", self.price.market_score),
            ("price.change_score", self.price.change_score),
            ("frequency.burst_score", self.frequency.burst_score),
            ("frequency.volume_score", self.frequency.volume_score),
            ("frequency.pattern_score", self.frequency.pattern_score),
            ("pattern.score", self.pattern.score),
            ("consistency.missing_score", self.consistency.missing_score),
            ("consistency.length_score", self.consistency.length_score),
            ("behavior.breadth_score", self.behavior.breadth_score),
            ("behavior.timing_score", self.behavior.timing_score),
            ("model.anomaly_threshold", self.model.anomaly_threshold),
        ];
        for (name, value) in bounded {
            if !(0.0..=1.0).contains(&value) {
                return Err(config_error(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        for (name, weight) in RiskFactor::ALL.iter().map(|f| (f.as_str(), self.weights.weight(*f))) {
            if weight < 0.0 {
                return Err(config_error(format!("weight '{}' must not be negative", name)));
            }
        }

        let windows = [
            ("price.market_sample_size", self.price.market_sample_size),
            ("frequency.volume_window", self.frequency.volume_window),
            ("behavior.history_window", self.behavior.history_window),
            ("model.training_window", self.model.training_window),
            ("model.trees", self.model.trees),
            ("model.subsample", self.model.subsample),
        ];
        for (name, size) in windows {
            if size == 0 {
                return Err(config_error(format!("{} must be greater than zero", name)));
            }
        }
        if self.model.min_training_samples < 2 {
            return Err(config_error("model.min_training_samples must be at least 2"));
        }
        if self.price.change_threshold <= 0.0 {
            return Err(config_error("price.change_threshold must be positive"));
        }

        Ok(())
    }

    /// Largest actor-history window any check needs.
    pub fn actor_history_window(&self) -> usize {
        self.frequency.volume_window.max(self.behavior.history_window)
    }
}

fn config_error(reason: impl Into<String>) -> LedgerError {
    LedgerError::ConfigError {
        reason: reason.into(),
    }
}
