// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail operations.
//!
//! Two physically separate tables back the two logically separate trails.
//! Entries are stored as their exact JSON serialization so a read-back is
//! bit-identical to what was written.

use rusqlite::params;
use stamp_core::audit::{AuditLogEntry, DeletionAuditLogEntry};
use stamp_core::StampError;

use crate::database::{map_tr_err, Database};

/// Append a conversation audit entry.
pub async fn append_audit(db: &Database, entry: &AuditLogEntry) -> Result<(), StampError> {
    let body = serde_json::to_string(entry).map_err(StampError::storage)?;
    let identity = entry.identity.clone();
    let date = entry.date.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (identity, date, body) VALUES (?1, ?2, ?3)",
                params![identity, date, body],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Conversation audit entries for one `(identity, date)` partition, in
/// append order.
pub async fn audit_entries(
    db: &Database,
    identity: &str,
    date: &str,
) -> Result<Vec<AuditLogEntry>, StampError> {
    let bodies = partition_bodies(db, "audit_log", identity, date).await?;
    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(StampError::storage))
        .collect()
}

/// Append a deletion audit entry.
pub async fn append_deletion_audit(
    db: &Database,
    entry: &DeletionAuditLogEntry,
) -> Result<(), StampError> {
    let body = serde_json::to_string(entry).map_err(StampError::storage)?;
    let identity = entry.identity.clone();
    let date = entry.date.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO deletion_audit_log (identity, date, body) VALUES (?1, ?2, ?3)",
                params![identity, date, body],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Deletion audit entries for one `(identity, date)` partition, in append
/// order.
pub async fn deletion_audit_entries(
    db: &Database,
    identity: &str,
    date: &str,
) -> Result<Vec<DeletionAuditLogEntry>, StampError> {
    let bodies = partition_bodies(db, "deletion_audit_log", identity, date).await?;
    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(StampError::storage))
        .collect()
}

/// Bodies for one `(identity, date)` partition of either trail table.
async fn partition_bodies(
    db: &Database,
    table: &'static str,
    identity: &str,
    date: &str,
) -> Result<Vec<String>, StampError> {
    let identity = identity.to_string();
    let date = date.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT body FROM {table} WHERE identity = ?1 AND date = ?2 ORDER BY seq ASC"
            ))?;
            let rows = stmt.query_map(params![identity, date], |row| row.get(0))?;
            let mut bodies = Vec::new();
            for row in rows {
                bodies.push(row?);
            }
            Ok(bodies)
        })
        .await
        .map_err(map_tr_err)
}
