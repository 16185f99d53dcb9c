// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deletion request operations.

use rusqlite::params;
use stamp_core::types::DeletionRequest;
use stamp_core::StampError;

use crate::database::{map_tr_err, ts, Database};

/// Insert a new deletion request. Fails with `Conflict` if the id exists.
pub async fn save_request(db: &Database, request: &DeletionRequest) -> Result<(), StampError> {
    let body = serde_json::to_string(request).map_err(StampError::storage)?;
    let id = request.id.clone();
    let identity = request.identity.clone();
    let status = request.status.to_string();
    let requested_at = ts(request.requested_at);
    let scheduled_at = ts(request.scheduled_deletion_at);

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO deletion_requests
                 (id, identity, status, requested_at, scheduled_deletion_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, identity, status, requested_at, scheduled_at, body],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changes == 0 {
        return Err(StampError::Conflict(format!(
            "deletion request {} already exists",
            request.id
        )));
    }
    Ok(())
}

/// Replace an existing deletion request document.
pub async fn update_request(db: &Database, request: &DeletionRequest) -> Result<(), StampError> {
    let body = serde_json::to_string(request).map_err(StampError::storage)?;
    let id = request.id.clone();
    let identity = request.identity.clone();
    let status = request.status.to_string();

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE deletion_requests SET status = ?3, body = ?4
                 WHERE identity = ?1 AND id = ?2",
                params![identity, id, status, body],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changes == 0 {
        return Err(StampError::NotFound {
            entity: "deletion request",
            id: request.id.clone(),
        });
    }
    Ok(())
}

/// Fetch one request from its identity partition.
pub async fn get_request(
    db: &Database,
    identity: &str,
    id: &str,
) -> Result<Option<DeletionRequest>, StampError> {
    let identity = identity.to_string();
    let id = id.to_string();
    let body: Option<String> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT body FROM deletion_requests WHERE identity = ?1 AND id = ?2",
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

/// The most recent request for an identity, regardless of status.
pub async fn get_request_by_identity(
    db: &Database,
    identity: &str,
) -> Result<Option<DeletionRequest>, StampError> {
    let identity = identity.to_string();
    let body: Option<String> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT body FROM deletion_requests WHERE identity = ?1
                 ORDER BY requested_at DESC LIMIT 1",
                params![identity],
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

/// All requests currently pending, across identities, oldest schedule first.
pub async fn get_all_pending(db: &Database) -> Result<Vec<DeletionRequest>, StampError> {
    let bodies: Vec<String> = db
        .connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM deletion_requests WHERE status = 'Pending'
                 ORDER BY scheduled_deletion_at ASC",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_core::types::DeletionStatus;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let (db, _dir) = setup_db().await;
        let request = DeletionRequest::new("user-1");
        save_request(&db, &request).await.unwrap();

        let retrieved = get_request(&db, "user-1", &request.id).await.unwrap().unwrap();
        assert_eq!(retrieved, request);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_transitions_status() {
        let (db, _dir) = setup_db().await;
        let mut request = DeletionRequest::new("user-1");
        save_request(&db, &request).await.unwrap();

        request.status = DeletionStatus::Cancelled;
        request.cancellation_reason = Some("changed my mind".to_string());
        update_request(&db, &request).await.unwrap();

        let retrieved = get_request(&db, "user-1", &request.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, DeletionStatus::Cancelled);
        assert_eq!(retrieved.cancellation_reason.as_deref(), Some("changed my mind"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_all_pending_excludes_terminal_requests() {
        let (db, _dir) = setup_db().await;

        let pending = DeletionRequest::new("user-1");
        save_request(&db, &pending).await.unwrap();

        let mut cancelled = DeletionRequest::new("user-2");
        save_request(&db, &cancelled).await.unwrap();
        cancelled.status = DeletionStatus::Cancelled;
        update_request(&db, &cancelled).await.unwrap();

        let all = get_all_pending(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, pending.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn by_identity_returns_most_recent() {
        let (db, _dir) = setup_db().await;
        let mut older = DeletionRequest::new("user-1");
        older.requested_at = older.requested_at - chrono::Duration::days(90);
        save_request(&db, &older).await.unwrap();
        let newer = DeletionRequest::new("user-1");
        save_request(&db, &newer).await.unwrap();

        let latest = get_request_by_identity(&db, "user-1").await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert!(get_request_by_identity(&db, "user-9").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
