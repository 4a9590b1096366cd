//! Error types for the landledger audit core.
//!
//! Soft signals (missing fields, an untrained model, a broken chain) are
//! never errors.  Only infrastructure and configuration failures are.

use thiserror::Error;

/// The unified error type for the landledger crates.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The storage collaborator could not serve a read or persist a record.
    ///
    /// Fatal for the append in progress: an event that cannot be durably
    /// recorded is never silently dropped.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// A conditional append was rejected because the property's latest hash
    /// is no longer the one the new entry links to.
    #[error("chain conflict on property '{property_id}': expected prev hash {expected:?}, found {found:?}")]
    ChainConflict {
        property_id: String,
        expected: Option<String>,
        found: Option<String>,
    },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// Anomaly-model training failed.  Never surfaced from an append.
    #[error("model error: {reason}")]
    ModelError { reason: String },

    /// A value could not be encoded for hashing or storage.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

/// Convenience alias used throughout the landledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
