//! Rule risk checks.
//!
//! Five independent families, each a pure function of the event and its
//! `HistoryContext`.  A family returns the highest score among its own
//! sub-checks (never their sum) together with that sub-check's reason.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use landledger_contracts::{
    error::{LedgerError, LedgerResult},
    property::{price_of, AuditEvent, Changes},
    risk::{CheckOutcome, RiskFactor},
};

use crate::{
    config::{
        BehaviorConfig, ConsistencyConfig, FrequencyConfig, PatternConfig, PriceConfig,
        RiskConfig,
    },
    context::{relative_change, text_field, HistoryContext},
};

// ── Suspicious-content patterns ──────────────────────────────────────────────

/// Compiled regexes for the pattern-match family.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<(&'static str, Regex)>,
}

impl PatternSet {
    /// Compile the built-in contact patterns plus the configured phrase lists.
    pub fn from_config(config: &PatternConfig) -> LedgerResult<Self> {
        let mut patterns = vec![
            (
                "phone",
                compile(r"\b(?:\+?\d{1,2}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b")?,
            ),
            ("url", compile(r"(?i)\b(?:https?://|www\.)\S+")?),
            ("email", compile(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")?),
        ];

        let lists = [
            ("marketing", &config.marketing_keywords),
            ("payment", &config.payment_phrases),
            ("guarantee", &config.guarantee_phrases),
        ];
        for (kind, words) in lists {
            if let Some(regex) = phrase_regex(words)? {
                patterns.push((kind, regex));
            }
        }

        Ok(Self { patterns })
    }

    /// Names of the pattern kinds that match `text`.
    pub fn matching_kinds(&self, text: &str) -> Vec<&'static str> {
        self.patterns
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|(_, re)| re.is_match(text))
    }

    /// Total pattern hits across the given text fields of a change-set.
    pub fn count_hits(&self, changes: &Changes, fields: &[String]) -> usize {
        fields
            .iter()
            .filter_map(|f| text_field(changes, f))
            .map(|text| self.matching_kinds(text).len())
            .sum()
    }
}

fn compile(pattern: &str) -> LedgerResult<Regex> {
    Regex::new(pattern).map_err(|e| LedgerError::ConfigError {
        reason: format!("invalid pattern '{}': {}", pattern, e),
    })
}

/// Case-insensitive, word-bounded alternation of literal phrases.
fn phrase_regex(words: &[String]) -> LedgerResult<Option<Regex>> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    compile(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).map(Some)
}

// ── Timing helper ─────────────────────────────────────────────────────────────

/// True when the first `count` timestamps (newest first) are each less than
/// `gap_secs` apart.
fn tight_sequence(timeline: &[DateTime<Utc>], count: usize, gap_secs: i64) -> bool {
    if count < 2 || timeline.len() < count {
        return false;
    }
    timeline[..count]
        .windows(2)
        .all(|pair| (pair[0] - pair[1]).num_seconds().abs() < gap_secs)
}

// ── Families ──────────────────────────────────────────────────────────────────

/// Price anomaly: market deviation first, bare relative change as fallback.
///
/// Requires a price on both the event and the previous entry.  A previous
/// price of zero counts as no prior price.
pub fn check_price_change(
    event: &AuditEvent,
    ctx: &HistoryContext,
    config: &PriceConfig,
) -> CheckOutcome {
    let Some(new_price) = price_of(&event.changes) else {
        return CheckOutcome::clear();
    };
    let Some(old_price) = ctx.previous.as_ref().and_then(|p| price_of(&p.changes)) else {
        return CheckOutcome::clear();
    };
    let Some(change) = relative_change(old_price, new_price) else {
        return CheckOutcome::clear();
    };

    if let Some(average) = ctx.market_average() {
        let deviation = (new_price - average).abs() / average;
        if deviation > config.market_deviation {
            return CheckOutcome::triggered(
                config.market_score,
                format!(
                    "Price deviates {:.1}% from market average of {:.2} across {} properties",
                    deviation * 100.0,
                    average,
                    ctx.market.len()
                ),
            );
        }
    }

    if change.abs() > config.change_threshold {
        return CheckOutcome::triggered(
            config.change_score,
            format!("Price changed by {:.1}%", change.abs() * 100.0),
        );
    }

    CheckOutcome::clear()
}

/// Update frequency: burst on this property, actor volume, and rapid-fire
/// pattern.  The max of the three.
pub fn check_update_frequency(ctx: &HistoryContext, config: &FrequencyConfig) -> CheckOutcome {
    let mut outcome = CheckOutcome::clear();

    if let Some(gap) = ctx.seconds_since_previous() {
        if gap < config.burst_window_secs {
            outcome = outcome.max(CheckOutcome::triggered(
                config.burst_score,
                format!("Property changed {}s after its previous update", gap),
            ));
        }
    }

    let volume = ctx.actor_history.iter().take(config.volume_window).count();
    if volume >= config.volume_threshold {
        outcome = outcome.max(CheckOutcome::triggered(
            config.volume_score,
            format!(
                "Actor made {} changes within their last {} audit entries",
                volume, config.volume_window
            ),
        ));
    }

    let timeline = ctx.actor_timeline();
    if tight_sequence(&timeline, config.pattern_min_updates, config.pattern_gap_secs) {
        outcome = outcome.max(CheckOutcome::triggered(
            config.pattern_score,
            format!(
                "Last {} changes by actor were each under {}s apart",
                config.pattern_min_updates, config.pattern_gap_secs
            ),
        ));
    }

    outcome
}

/// Pattern match: contact details, marketing and payment language, and
/// guarantee/confidentiality phrasing in the scanned text fields.
pub fn check_pattern_match(
    event: &AuditEvent,
    patterns: &PatternSet,
    config: &PatternConfig,
) -> CheckOutcome {
    let flagged: Vec<&str> = config
        .fields
        .iter()
        .filter(|field| {
            text_field(&event.changes, field)
                .map(|text| patterns.is_match(text))
                .unwrap_or(false)
        })
        .map(String::as_str)
        .collect();

    if flagged.is_empty() {
        CheckOutcome::clear()
    } else {
        CheckOutcome::triggered(
            config.score,
            format!("Suspicious patterns found in: {}", flagged.join(", ")),
        )
    }
}

/// Data consistency: required fields present, text lengths within bounds.
pub fn check_data_consistency(event: &AuditEvent, config: &ConsistencyConfig) -> CheckOutcome {
    let mut outcome = CheckOutcome::clear();

    let missing: Vec<&str> = config
        .required_fields
        .iter()
        .filter(|f| event.changes.get(f.as_str()).map_or(true, |v| v.is_null()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        outcome = outcome.max(CheckOutcome::triggered(
            config.missing_score,
            format!("Missing required fields: {}", missing.join(", ")),
        ));
    }

    let bounds = [
        ("terms", config.terms_min_len, config.terms_max_len),
        ("location", config.location_min_len, config.location_max_len),
    ];
    let out_of_bounds: Vec<String> = bounds
        .iter()
        .filter_map(|(field, min, max)| {
            let len = text_field(&event.changes, field)?.chars().count();
            (len < *min || len > *max)
                .then(|| format!("{} length {} outside [{}, {}]", field, len, min, max))
        })
        .collect();
    if !out_of_bounds.is_empty() {
        outcome = outcome.max(CheckOutcome::triggered(
            config.length_score,
            format!("Invalid field lengths: {}", out_of_bounds.join(", ")),
        ));
    }

    outcome
}

/// User behavior: how many properties the actor touches, and how tightly
/// their recent changes cluster in time.
pub fn check_user_behavior(
    event: &AuditEvent,
    ctx: &HistoryContext,
    config: &BehaviorConfig,
) -> CheckOutcome {
    if event.user.is_none() {
        return CheckOutcome::clear();
    }

    let mut outcome = CheckOutcome::clear();

    let managed = ctx.distinct_properties(&event.property_id, config.history_window);
    if managed > config.max_properties {
        outcome = outcome.max(CheckOutcome::triggered(
            config.breadth_score,
            format!("Actor manages {} distinct properties", managed),
        ));
    }

    let timeline = ctx.actor_timeline();
    if tight_sequence(&timeline, config.timing_min_updates, config.timing_gap_secs) {
        outcome = outcome.max(CheckOutcome::triggered(
            config.timing_score,
            format!(
                "Last {} changes by actor were each within {}s of each other",
                config.timing_min_updates, config.timing_gap_secs
            ),
        ));
    }

    outcome
}

// ── Runner ────────────────────────────────────────────────────────────────────

/// All five families, evaluated over one shared context.
#[derive(Debug, Clone)]
pub struct RuleChecks {
    patterns: PatternSet,
}

impl RuleChecks {
    pub fn new(config: &RiskConfig) -> LedgerResult<Self> {
        Ok(Self {
            patterns: PatternSet::from_config(&config.pattern)?,
        })
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Run every family and return each one's outcome, in evaluation order.
    pub fn evaluate(
        &self,
        event: &AuditEvent,
        ctx: &HistoryContext,
        config: &RiskConfig,
    ) -> BTreeMap<RiskFactor, CheckOutcome> {
        let mut outcomes = BTreeMap::new();
        for factor in RiskFactor::ALL {
            let outcome = match factor {
                RiskFactor::PriceChange => check_price_change(event, ctx, &config.price),
                RiskFactor::UpdateFrequency => check_update_frequency(ctx, &config.frequency),
                RiskFactor::PatternMatch => {
                    check_pattern_match(event, &self.patterns, &config.pattern)
                }
                RiskFactor::DataConsistency => {
                    check_data_consistency(event, &config.consistency)
                }
                RiskFactor::UserBehavior => check_user_behavior(event, ctx, &config.behavior),
            };
            debug!(
                property_id = %event.property_id,
                factor = %factor,
                score = outcome.score,
                "rule check evaluated"
            );
            outcomes.insert(factor, outcome);
        }
        outcomes
    }
}
