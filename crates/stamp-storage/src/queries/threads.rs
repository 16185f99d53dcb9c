// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation thread operations.
//!
//! Threads are stored as single JSON documents keyed by `(identity, id)`;
//! the extra columns exist only for indexed lookups.

use rusqlite::params;
use stamp_core::types::ConversationThread;
use stamp_core::StampError;

use crate::database::{map_tr_err, ts, Database};

/// Insert a new thread document. Fails with `Conflict` if the id exists.
pub async fn create_thread(db: &Database, thread: &ConversationThread) -> Result<(), StampError> {
    let body = serde_json::to_string(thread).map_err(StampError::storage)?;
    let id = thread.id.clone();
    let identity = thread.identity.clone();
    let session_id = thread.session_id.clone();
    let updated_at = ts(thread.updated_at);
    let expires_at = thread.expires_at.map(ts);

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO threads (id, identity, session_id, updated_at, expires_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, identity, session_id, updated_at, expires_at, body],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changes == 0 {
        return Err(StampError::Conflict(format!(
            "thread {} already exists",
            thread.id
        )));
    }
    Ok(())
}

/// Fetch one thread from its identity partition.
pub async fn get_thread(
    db: &Database,
    identity: &str,
    id: &str,
) -> Result<Option<ConversationThread>, StampError> {
    let identity = identity.to_string();
    let id = id.to_string();
    let body: Option<String> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT body FROM threads WHERE identity = ?1 AND id = ?2",
                params![identity, id],
                |row| row.get(0),
            );
            match result {
                Ok(body) => Ok(Some(body)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;

    body.map(|b| serde_json::from_str(&b).map_err(StampError::storage))
        .transpose()
}

/// Replace an existing thread document.
///
/// An update never inserts: a thread deleted by the erasure lifecycle
/// stays deleted, and the racing writer gets `NotFound`.
pub async fn update_thread(db: &Database, thread: &ConversationThread) -> Result<(), StampError> {
    let body = serde_json::to_string(thread).map_err(StampError::storage)?;
    let id = thread.id.clone();
    let identity = thread.identity.clone();
    let session_id = thread.session_id.clone();
    let updated_at = ts(thread.updated_at);
    let expires_at = thread.expires_at.map(ts);

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE threads SET session_id = ?3, updated_at = ?4, expires_at = ?5, body = ?6
                 WHERE identity = ?1 AND id = ?2",
                params![identity, id, session_id, updated_at, expires_at, body],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changes == 0 {
        return Err(StampError::NotFound {
            entity: "thread",
            id: thread.id.clone(),
        });
    }
    Ok(())
}

/// Most recently updated threads for an identity, newest first.
pub async fn recent_threads(
    db: &Database,
    identity: &str,
    limit: usize,
) -> Result<Vec<ConversationThread>, StampError> {
    let identity = identity.to_string();
    let limit = limit as i64;
    let bodies: Vec<String> = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM threads WHERE identity = ?1
                 ORDER BY updated_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![identity, limit], |row| row.get(0))?;
            let mut bodies = Vec::new();
            for row in rows {
                bodies.push(row?);
            }
            Ok(bodies)
        })
        .await
        .map_err(map_tr_err)?;

    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(StampError::storage))
        .collect()
}

/// Delete a single thread. Deleting a missing thread is a no-op.
pub async fn delete_thread(db: &Database, identity: &str, id: &str) -> Result<(), StampError> {
    let identity = identity.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM threads WHERE identity = ?1 AND id = ?2",
                params![identity, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Bulk erasure of every thread an identity owns; returns the count.
pub async fn delete_all_conversations(db: &Database, identity: &str) -> Result<u64, StampError> {
    let identity = identity.to_string();
    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute("DELETE FROM threads WHERE identity = ?1", params![identity])?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changes as u64)
}
