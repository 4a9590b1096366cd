//! Property, actor, and mutation-event types.
//!
//! These types describe what enters the audit pipeline.  landledger does not
//! own the property entity itself; it only sees the change-set of each
//! mutation plus the handful of fields needed to score risk.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of the property a mutation applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

impl PropertyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field name → new value snapshot carried by every mutation.
///
/// Values are arbitrary JSON and may nest; hashing canonicalizes them
/// recursively, so the map type here does not affect the digest.
pub type Changes = BTreeMap<String, serde_json::Value>;

/// The `price` field of a change-set, as a finite number.
///
/// Accepts JSON numbers and numeric strings; anything else is no price.
pub fn price_of(changes: &Changes) -> Option<f64> {
    let price = match changes.get("price")? {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}

/// Reference to the actor that performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            email: email.into(),
        }
    }

    /// The identity used for actor-scoped history queries.
    ///
    /// Falls back to the email address when the actor has no stored id.
    pub fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.email)
    }
}

/// The kind of mutation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only market sample row: one known property with its location and
/// listed price, used as price context for the anomaly checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySample {
    pub property_id: PropertyId,
    pub location: String,
    pub price: f64,
    pub updated_at: DateTime<Utc>,
}

/// A property mutation as handed to `AuditService::append` by the CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub property_id: PropertyId,
    pub action: Action,
    pub changes: Changes,
    /// Absent for system-initiated mutations.
    pub user: Option<UserRef>,
    /// Event time.  Raised to the latest stored timestamp for the property
    /// when it would otherwise go backwards.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event stamped with the current wall-clock time.
    pub fn new(
        property_id: PropertyId,
        action: Action,
        changes: Changes,
        user: Option<UserRef>,
    ) -> Self {
        Self {
            property_id,
            action,
            changes,
            user,
            timestamp: Utc::now(),
        }
    }

    /// Override the event time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn actor_identity(&self) -> Option<&str> {
        self.user.as_ref().map(UserRef::identity)
    }
}
