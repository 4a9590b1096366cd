//! Feature extraction for the anomaly model.
//!
//! Every event maps to a fixed-order numeric vector.  The same assembly is
//! used online (from a gathered `HistoryContext`) and offline (replaying a
//! window of stored entries for training), so the model scores exactly the
//! quantities it was fitted on.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use landledger_contracts::{
    audit::AuditLogEntry,
    property::{price_of, AuditEvent, Changes},
};

use crate::{
    config::RiskConfig,
    context::{relative_change, text_field, HistoryContext},
    rules::PatternSet,
};

/// Vector dimensions, in order: price change ratio, new price, seconds since
/// the previous entry, actor's recent entries, actor's distinct properties,
/// location length, terms length, buyer intent length, pattern hits.
pub const FEATURE_COUNT: usize = 9;

/// One event's feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// The history-derived inputs, independent of where they were read from.
struct Surroundings<'a> {
    previous_changes: Option<&'a Changes>,
    seconds_since_previous: Option<i64>,
    actor_recent: usize,
    actor_distinct: usize,
}

fn assemble(changes: &Changes, around: Surroundings<'_>, pattern_hits: usize) -> FeatureVector {
    let new_price = price_of(changes);
    let change_ratio = match (around.previous_changes.and_then(price_of), new_price) {
        (Some(old), Some(new)) => relative_change(old, new).unwrap_or(0.0),
        _ => 0.0,
    };
    let len = |name: &str| text_field(changes, name).map_or(0, |s| s.chars().count()) as f64;

    FeatureVector([
        change_ratio,
        new_price.unwrap_or(0.0),
        around.seconds_since_previous.unwrap_or(0) as f64,
        around.actor_recent as f64,
        around.actor_distinct as f64,
        len("location"),
        len("terms"),
        len("buyer_intent"),
        pattern_hits as f64,
    ])
}

/// Features for a live event.
pub fn event_features(
    event: &AuditEvent,
    ctx: &HistoryContext,
    patterns: &PatternSet,
    config: &RiskConfig,
) -> FeatureVector {
    let around = Surroundings {
        previous_changes: ctx.previous.as_ref().map(|p| &p.changes),
        seconds_since_previous: ctx.seconds_since_previous(),
        actor_recent: ctx
            .actor_history
            .iter()
            .take(config.frequency.volume_window)
            .count(),
        actor_distinct: if event.user.is_some() {
            ctx.distinct_properties(&event.property_id, config.behavior.history_window)
        } else {
            0
        },
    };
    let hits = patterns.count_hits(&event.changes, &config.pattern.fields);
    assemble(&event.changes, around, hits)
}

/// Replay stored entries (newest first, as the store returns them) and
/// build the vector each one would have had when it was appended.
///
/// Only history inside the window is visible to the replay, so the oldest
/// entries see a truncated past.
pub fn training_features(
    entries: &[AuditLogEntry],
    patterns: &PatternSet,
    config: &RiskConfig,
) -> Vec<FeatureVector> {
    let mut last_by_property: HashMap<&str, &AuditLogEntry> = HashMap::new();
    let mut by_actor: HashMap<&str, VecDeque<&str>> = HashMap::new();
    let actor_window = config.actor_history_window();
    let mut features = Vec::with_capacity(entries.len());

    for entry in entries.iter().rev() {
        let previous = last_by_property.get(entry.property_id.as_str()).copied();
        let actor = entry.actor_identity();
        let history = actor.and_then(|a| by_actor.get(a));

        let actor_recent = history
            .map(|h| h.iter().take(config.frequency.volume_window).count())
            .unwrap_or(0);
        let actor_distinct = match (actor, history) {
            (Some(_), Some(h)) => {
                let mut ids: Vec<&str> = std::iter::once(entry.property_id.as_str())
                    .chain(h.iter().take(config.behavior.history_window).copied())
                    .collect();
                ids.sort_unstable();
                ids.dedup();
                ids.len()
            }
            (Some(_), None) => 1,
            _ => 0,
        };

        let around = Surroundings {
            previous_changes: previous.map(|p| &p.changes),
            seconds_since_previous: previous
                .map(|p| (entry.timestamp - p.timestamp).num_seconds().max(0)),
            actor_recent,
            actor_distinct,
        };
        let hits = patterns.count_hits(&entry.changes, &config.pattern.fields);
        features.push(assemble(&entry.changes, around, hits));

        last_by_property.insert(entry.property_id.as_str(), entry);
        if let Some(actor) = actor {
            let queue = by_actor.entry(actor).or_default();
            queue.push_front(entry.property_id.as_str());
            queue.truncate(actor_window);
        }
    }

    features
}
