// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tamper-evident audit entry types with hash chaining.
//!
//! Two logically separate trails share the same mechanics: the ordinary
//! conversation audit log (state transitions driven by confirmed writes)
//! and the deletion audit log (GDPR lifecycle transitions, retained
//! independently of conversation lifetime).
//!
//! Each entry carries the SHA-256 of its payload chained onto the previous
//! entry's hash within the same `(identity, date)` partition, so any
//! after-the-fact edit breaks the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An entry in the ordinary conversation audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    /// Owner identity; partition key together with `date`.
    pub identity: String,
    /// `YYYY-MM-DD` date partition.
    pub date: String,
    pub at: DateTime<Utc>,
    /// What happened, e.g. "state.clock_in.confirmed".
    pub kind: String,
    pub detail: serde_json::Value,
    pub prev_hash: Option<String>,
    pub hash: String,
}

impl AuditLogEntry {
    /// Build a chained entry. `prev_hash` is the hash of the most recent
    /// entry in the same partition, or `None` for the first entry.
    pub fn chained(
        identity: impl Into<String>,
        kind: impl Into<String>,
        detail: serde_json::Value,
        prev_hash: Option<String>,
    ) -> Self {
        let at = Utc::now();
        let identity = identity.into();
        let kind = kind.into();
        let hash = chain_hash(
            prev_hash.as_deref(),
            &format!("{identity}|{kind}|{detail}|{}", at.to_rfc3339()),
        );
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: at.format("%Y-%m-%d").to_string(),
            identity,
            at,
            kind,
            detail,
            prev_hash,
            hash,
        }
    }
}

/// An entry in the deletion audit trail, mirroring every lifecycle
/// transition of a deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionAuditLogEntry {
    pub id: String,
    pub identity: String,
    /// `YYYY-MM-DD` date partition.
    pub date: String,
    pub at: DateTime<Utc>,
    pub request_id: String,
    pub from_status: String,
    pub to_status: String,
    pub detail: serde_json::Value,
    pub prev_hash: Option<String>,
    pub hash: String,
}

impl DeletionAuditLogEntry {
    /// Build a chained transition entry for a deletion request.
    pub fn chained(
        identity: impl Into<String>,
        request_id: impl Into<String>,
        from_status: impl Into<String>,
        to_status: impl Into<String>,
        detail: serde_json::Value,
        prev_hash: Option<String>,
    ) -> Self {
        let at = Utc::now();
        let identity = identity.into();
        let request_id = request_id.into();
        let from_status = from_status.into();
        let to_status = to_status.into();
        let hash = chain_hash(
            prev_hash.as_deref(),
            &format!(
                "{identity}|{request_id}|{from_status}|{to_status}|{detail}|{}",
                at.to_rfc3339()
            ),
        );
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: at.format("%Y-%m-%d").to_string(),
            identity,
            at,
            request_id,
            from_status,
            to_status,
            detail,
            prev_hash,
            hash,
        }
    }
}

/// SHA-256 over the previous hash concatenated with the payload, hex-encoded.
pub fn chain_hash(prev: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_hash_depends_on_previous() {
        let a = chain_hash(None, "payload");
        let b = chain_hash(Some(&a), "payload");
        assert_ne!(a, b);
        // Stable for identical inputs.
        assert_eq!(chain_hash(None, "payload"), a);
    }

    #[test]
    fn audit_entry_json_round_trips_bit_identical() {
        let entry = AuditLogEntry::chained(
            "user-1",
            "state.clock_in.confirmed",
            serde_json::json!({"thread_id": "t1"}),
            None,
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }

    #[test]
    fn deletion_audit_entry_round_trips() {
        let entry = DeletionAuditLogEntry::chained(
            "user-1",
            "req-1",
            "Pending",
            "Processing",
            serde_json::json!({}),
            Some("abc".to_string()),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: DeletionAuditLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn chained_entries_link_hashes() {
        let first = AuditLogEntry::chained("u", "k", serde_json::json!(1), None);
        let second = AuditLogEntry::chained("u", "k", serde_json::json!(2), Some(first.hash.clone()));
        assert_eq!(second.prev_hash.as_deref(), Some(first.hash.as_str()));
        assert_ne!(first.hash, second.hash);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn chain_hash_is_deterministic(payload in ".{0,64}") {
                prop_assert_eq!(chain_hash(None, &payload), chain_hash(None, &payload));
            }

            #[test]
            fn chain_hash_is_prev_sensitive(payload in ".{1,64}", prev in "[0-9a-f]{8,64}") {
                prop_assert_ne!(chain_hash(None, &payload), chain_hash(Some(&prev), &payload));
            }
        }
    }
}
