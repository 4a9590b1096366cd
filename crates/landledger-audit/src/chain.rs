//! Canonical encoding, hashing, and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. canonical JSON of `changes`: object keys sorted ascending at every
//!      nesting level, arrays in order, no whitespace, numbers and strings
//!      in serde_json's fixed textual form
//!   2. a single marker byte: `0x00` when there is no previous hash,
//!      `0x01` when there is
//!   3. the previous hash as UTF-8 bytes (64 ASCII hex chars), if present
//!
//! The marker keeps "no predecessor" distinct from every possible hash.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use landledger_contracts::{
    audit::{AuditLogEntry, ChainBreak, VerificationResult},
    error::{LedgerError, LedgerResult},
    property::Changes,
};

/// Append the canonical encoding of `value` to `out`.
pub fn canonical_encode(value: &Value, out: &mut Vec<u8>) -> LedgerResult<()> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            serde_json::to_writer(&mut *out, value).map_err(|e| LedgerError::Serialization {
                reason: format!("failed to encode scalar for hashing: {}", e),
            })
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                canonical_encode(item, out)?;
            }
            out.push(b']');
            Ok(())
        }
        Value::Object(map) => encode_object(map.iter(), out),
    }
}

/// Encode a mapping with its keys sorted, whatever order `entries` yields.
fn encode_object<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
    out: &mut Vec<u8>,
) -> LedgerResult<()> {
    let mut sorted: Vec<(&String, &Value)> = entries.collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    out.push(b'{');
    for (i, (key, value)) in sorted.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, key).map_err(|e| LedgerError::Serialization {
            reason: format!("failed to encode key '{}' for hashing: {}", key, e),
        })?;
        out.push(b':');
        canonical_encode(value, out)?;
    }
    out.push(b'}');
    Ok(())
}

/// Canonical bytes of a whole change-set.
pub fn encode_changes(changes: &Changes) -> LedgerResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_object(changes.iter(), &mut out)?;
    Ok(out)
}

/// SHA-256 over the canonical encoding of `changes` and `prev_hash`.
///
/// Returns a lowercase 64-character hex string.  Pure: identical inputs
/// always give the identical hash, regardless of key order in nested maps.
pub fn digest(changes: &Changes, prev_hash: Option<&str>) -> LedgerResult<String> {
    let encoded = encode_changes(changes)?;

    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    match prev_hash {
        Some(prev) => {
            hasher.update([0x01]);
            hasher.update(prev.as_bytes());
        }
        None => hasher.update([0x00]),
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Walk one property's entries (oldest first) and report the first break.
///
/// Two rules are checked per entry:
///
/// 1. **Linkage**: `prev_hash` is absent for entry 0 and equals the stored
///    `hash` of the preceding entry thereafter.
/// 2. **Hash correctness**: `hash` matches the digest recomputed from the
///    entry's own `changes` and the expected previous hash.
///
/// An empty chain is valid.  Read-only.
pub fn verify_chain(entries: &[AuditLogEntry]) -> VerificationResult {
    let mut expected_prev: Option<&str> = None;

    for (index, entry) in entries.iter().enumerate() {
        if entry.prev_hash.as_deref() != expected_prev {
            return VerificationResult::broken(index, ChainBreak::LinkMismatch, index + 1);
        }

        // An entry that cannot be re-encoded cannot be vouched for.
        let matches = match digest(&entry.changes, expected_prev) {
            Ok(recomputed) => recomputed == entry.hash,
            Err(e) => {
                warn!(
                    property_id = %entry.property_id,
                    index,
                    error = %e,
                    "could not recompute entry hash"
                );
                false
            }
        };
        if !matches {
            return VerificationResult::broken(index, ChainBreak::HashMismatch, index + 1);
        }

        expected_prev = Some(entry.hash.as_str());
    }

    VerificationResult::valid(entries.len())
}
