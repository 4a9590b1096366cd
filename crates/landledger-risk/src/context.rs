//! Historical context shared by the rule checks and the feature builder.
//!
//! All storage reads for one assessment happen here, up front, so the checks
//! themselves stay pure functions of `(event, context)`.

use chrono::{DateTime, Utc};
use tracing::debug;

use landledger_contracts::{
    audit::AuditLogEntry,
    error::LedgerResult,
    property::{price_of, AuditEvent, Changes, PropertyId, PropertySample},
};
use landledger_core::traits::AuditStore;

use crate::config::RiskConfig;

/// Read a string field from a change-set.
pub fn text_field<'c>(changes: &'c Changes, name: &str) -> Option<&'c str> {
    changes.get(name).and_then(|v| v.as_str())
}

/// Relative change from `previous` to `current`.
///
/// A zero or negative previous price is treated as "no prior price".
pub fn relative_change(previous: f64, current: f64) -> Option<f64> {
    if previous > 0.0 {
        Some((current - previous) / previous)
    } else {
        None
    }
}

/// Everything the checks know about an event's surroundings.
#[derive(Debug, Clone)]
pub struct HistoryContext {
    /// Event time, never earlier than the property's latest timestamp.
    pub now: DateTime<Utc>,
    /// The property's most recent entry before this event.
    pub previous: Option<AuditLogEntry>,
    /// The actor's recent entries, newest first.  Empty for system events.
    pub actor_history: Vec<AuditLogEntry>,
    /// Same-location market sample for the price check.
    pub market: Vec<PropertySample>,
}

impl HistoryContext {
    /// Issue the bounded reads an assessment needs.
    pub fn gather(
        event: &AuditEvent,
        previous: Option<&AuditLogEntry>,
        store: &dyn AuditStore,
        config: &RiskConfig,
    ) -> LedgerResult<Self> {
        // `AuditService` clamps before assessing; callers of `assess` outside
        // the service rely on this one.
        let now = previous
            .map(|p| p.timestamp.max(event.timestamp))
            .unwrap_or(event.timestamp);

        let actor_history = match event.actor_identity() {
            Some(actor) => store.recent_entries_by_user(actor, config.actor_history_window())?,
            None => Vec::new(),
        };

        let market = match text_field(&event.changes, "location") {
            Some(location) if price_of(&event.changes).is_some() => store.market_sample(
                location,
                &event.property_id,
                config.price.market_sample_size,
            )?,
            _ => Vec::new(),
        };

        debug!(
            property_id = %event.property_id,
            actor_entries = actor_history.len(),
            market_samples = market.len(),
            has_previous = previous.is_some(),
            "history context gathered"
        );

        Ok(Self {
            now,
            previous: previous.cloned(),
            actor_history,
            market,
        })
    }

    /// Event timestamps for the actor, newest first, with the current event
    /// at the head.
    pub fn actor_timeline(&self) -> Vec<DateTime<Utc>> {
        std::iter::once(self.now)
            .chain(self.actor_history.iter().map(|e| e.timestamp))
            .collect()
    }

    /// Distinct properties among `current` and the actor's first `window`
    /// history entries.
    pub fn distinct_properties(&self, current: &PropertyId, window: usize) -> usize {
        let mut ids: Vec<&str> = std::iter::once(current.as_str())
            .chain(
                self.actor_history
                    .iter()
                    .take(window)
                    .map(|e| e.property_id.as_str()),
            )
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn market_average(&self) -> Option<f64> {
        let prices: Vec<f64> = self
            .market
            .iter()
            .map(|s| s.price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();
        if prices.is_empty() {
            None
        } else {
            Some(prices.iter().sum::<f64>() / prices.len() as f64)
        }
    }

    /// Seconds between the previous entry and this event, if any.
    pub fn seconds_since_previous(&self) -> Option<i64> {
        self.previous
            .as_ref()
            .map(|p| (self.now - p.timestamp).num_seconds().max(0))
    }
}
