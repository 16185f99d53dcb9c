// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue item operations implementing the optimistic lock protocol.
//!
//! The `status`, `retry_count`, `version`, `next_retry_at`,
//! `lock_expires_at`, `updated_at`, and `expires_at` columns are
//! authoritative for the fields that change under the lock protocol; the
//! `body` document carries everything else. Reads overlay the live columns
//! onto the decoded document, so a `try_lock` that only touches columns
//! never leaves a stale read behind.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::params;
use stamp_core::types::{QueueItem, QueueStatus};
use stamp_core::StampError;

use crate::database::{map_tr_err, parse_ts, ts, Database};

/// Raw row: the JSON document plus the live columns.
struct QueueRow {
    body: String,
    status: String,
    retry_count: i64,
    version: i64,
    next_retry_at: Option<String>,
    lock_expires_at: Option<String>,
    updated_at: String,
    expires_at: String,
}

const ROW_COLUMNS: &str =
    "body, status, retry_count, version, next_retry_at, lock_expires_at, updated_at, expires_at";

fn row_from_sql(row: &rusqlite::Row<'_>) -> Result<QueueRow, rusqlite::Error> {
    Ok(QueueRow {
        body: row.get(0)?,
        status: row.get(1)?,
        retry_count: row.get(2)?,
        version: row.get(3)?,
        next_retry_at: row.get(4)?,
        lock_expires_at: row.get(5)?,
        updated_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

/// Decode a row, overlaying the live columns onto the document.
fn decode_row(row: QueueRow) -> Result<QueueItem, StampError> {
    let mut item: QueueItem = serde_json::from_str(&row.body).map_err(StampError::storage)?;
    item.status = QueueStatus::from_str(&row.status)
        .map_err(|_| StampError::Internal(format!("unknown queue status `{}`", row.status)))?;
    item.retry_count = row.retry_count as u32;
    item.version = row.version;
    item.next_retry_at = row.next_retry_at.as_deref().map(parse_ts).transpose()?;
    item.lock_expires_at = row.lock_expires_at.as_deref().map(parse_ts).transpose()?;
    item.updated_at = parse_ts(&row.updated_at)?;
    item.expires_at = parse_ts(&row.expires_at)?;
    Ok(item)
}

/// Insert a new queue item. Fails with `Conflict` if the id exists.
pub async fn put_item(db: &Database, item: &QueueItem) -> Result<(), StampError> {
    let body = serde_json::to_string(item).map_err(StampError::storage)?;
    let id = item.id.clone();
    let identity = item.identity.clone();
    let status = item.status.to_string();
    let retry_count = i64::from(item.retry_count);
    let version = item.version;
    let next_retry_at = item.next_retry_at.map(ts);
    let lock_expires_at = item.lock_expires_at.map(ts);
    let updated_at = ts(item.updated_at);
    let expires_at = ts(item.expires_at);

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO queue_items
                 (id, identity, status, retry_count, version, next_retry_at,
                  lock_expires_at, expires_at, updated_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    identity,
                    status,
                    retry_count,
                    version,
                    next_retry_at,
                    lock_expires_at,
                    expires_at,
                    updated_at,
                    body
                ],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changes == 0 {
        return Err(StampError::Conflict(format!(
            "queue item {} already exists",
            item.id
        )));
    }
    Ok(())
}

/// Fetch one item from its identity partition.
pub async fn get_item(
    db: &Database,
    identity: &str,
    id: &str,
) -> Result<Option<QueueItem>, StampError> {
    let identity = identity.to_string();
    let id = id.to_string();
    let row: Option<QueueRow> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {ROW_COLUMNS} FROM queue_items WHERE identity = ?1 AND id = ?2"),
                params![identity, id],
                row_from_sql,
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;

    row.map(decode_row).transpose()
}

/// Items ready for a retry attempt at `now`: pending items whose backoff
/// has elapsed, plus processing items whose lock lease expired (reclaim).
pub async fn pending_ready(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<QueueItem>, StampError> {
    let now = ts(now);
    let limit = limit as i64;
    let rows: Vec<QueueRow> = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROW_COLUMNS} FROM queue_items
                 WHERE (status = 'pending' AND next_retry_at IS NOT NULL AND next_retry_at <= ?1)
                    OR (status = 'processing' AND lock_expires_at IS NOT NULL AND lock_expires_at <= ?1)
                 ORDER BY next_retry_at ASC
                 LIMIT ?2"
            ))?;
            let mapped = stmt.query_map(params![now, limit], row_from_sql)?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(decode_row).collect()
}

/// Atomically claim an item for processing via a conditional write on the
/// version token. Exactly one of two racing callers succeeds.
pub async fn try_lock_item(
    db: &Database,
    identity: &str,
    id: &str,
    expected_version: i64,
    lease_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, StampError> {
    let identity = identity.to_string();
    let id = id.to_string();
    let lease_until = ts(lease_until);
    let now_s = ts(now);

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE queue_items
                 SET status = 'processing', version = version + 1,
                     lock_expires_at = ?4, updated_at = ?5
                 WHERE identity = ?1 AND id = ?2 AND version = ?3
                   AND (status = 'pending'
                        OR (status = 'processing' AND lock_expires_at IS NOT NULL AND lock_expires_at <= ?5))",
                params![identity, id, expected_version, lease_until, now_s],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    Ok(changes == 1)
}

/// Rewrite an item after a retry attempt. The caller holds the lock, so
/// this write is unconditional.
pub async fn update_item(db: &Database, item: &QueueItem) -> Result<(), StampError> {
    let body = serde_json::to_string(item).map_err(StampError::storage)?;
    let id = item.id.clone();
    let identity = item.identity.clone();
    let status = item.status.to_string();
    let retry_count = i64::from(item.retry_count);
    let version = item.version;
    let next_retry_at = item.next_retry_at.map(ts);
    let lock_expires_at = item.lock_expires_at.map(ts);
    let updated_at = ts(item.updated_at);
    let expires_at = ts(item.expires_at);

    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE queue_items
                 SET status = ?3, retry_count = ?4, version = ?5, next_retry_at = ?6,
                     lock_expires_at = ?7, expires_at = ?8, updated_at = ?9, body = ?10
                 WHERE identity = ?1 AND id = ?2",
                params![
                    identity,
                    id,
                    status,
                    retry_count,
                    version,
                    next_retry_at,
                    lock_expires_at,
                    expires_at,
                    updated_at,
                    body
                ],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changes == 0 {
        return Err(StampError::NotFound {
            entity: "queue item",
            id: item.id.clone(),
        });
    }
    Ok(())
}

/// The most recently updated item for an identity, for status reads.
pub async fn latest_for_identity(
    db: &Database,
    identity: &str,
) -> Result<Option<QueueItem>, StampError> {
    let identity = identity.to_string();
    let row: Option<QueueRow> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {ROW_COLUMNS} FROM queue_items WHERE identity = ?1
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![identity],
                row_from_sql,
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;

    row.map(decode_row).transpose()
}

/// Garbage-collect terminal items whose TTL has passed; returns the count.
pub async fn sweep_expired_items(db: &Database, now: DateTime<Utc>) -> Result<u64, StampError> {
    let now = ts(now);
    let changes = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM queue_items
                 WHERE status IN ('completed', 'failed') AND expires_at <= ?1",
                params![now],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stamp_core::types::{ClockAction, DEFAULT_MAX_RETRIES, QUEUE_ITEM_TTL_DAYS};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_item(identity: &str) -> QueueItem {
        let now = Utc::now();
        QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            action: ClockAction::ClockIn,
            target_time: now,
            thread_id: "t1".to_string(),
            message_id: "m1".to_string(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            status: QueueStatus::Pending,
            next_retry_at: Some(now + Duration::seconds(1)),
            last_error: Some("502 Bad Gateway".to_string()),
            last_status_code: Some(502),
            context: BTreeMap::new(),
            version: 0,
            lock_expires_at: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(QUEUE_ITEM_TTL_DAYS),
        }
    }

    #[tokio::test]
    async fn put_and_get_round_trips() {
        let (db, _dir) = setup_db().await;
        let item = make_item("user-1");
        put_item(&db, &item).await.unwrap();

        let retrieved = get_item(&db, "user-1", &item.id).await.unwrap().unwrap();
        assert_eq!(retrieved.action, ClockAction::ClockIn);
        assert_eq!(retrieved.status, QueueStatus::Pending);
        assert_eq!(retrieved.last_status_code, Some(502));
        assert_eq!(retrieved.version, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_ready_respects_next_retry_at() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let mut due = make_item("user-1");
        due.next_retry_at = Some(now - Duration::seconds(1));
        put_item(&db, &due).await.unwrap();

        let mut future = make_item("user-1");
        future.next_retry_at = Some(now + Duration::seconds(60));
        put_item(&db, &future).await.unwrap();

        let ready = pending_ready(&db, now, 10).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, due.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn try_lock_claims_exactly_once_per_version() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let item = make_item("user-1");
        put_item(&db, &item).await.unwrap();

        let lease = now + Duration::seconds(30);
        let first = try_lock_item(&db, "user-1", &item.id, 0, lease, now).await.unwrap();
        let second = try_lock_item(&db, "user-1", &item.id, 0, lease, now).await.unwrap();
        assert!(first);
        assert!(!second, "stale version must lose the race");

        let locked = get_item(&db, "user-1", &item.id).await.unwrap().unwrap();
        assert_eq!(locked.status, QueueStatus::Processing);
        assert_eq!(locked.version, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_processing_lease_is_reclaimable() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let item = make_item("user-1");
        put_item(&db, &item).await.unwrap();

        // First worker locks with a short lease and stalls.
        assert!(
            try_lock_item(&db, "user-1", &item.id, 0, now + Duration::seconds(30), now)
                .await
                .unwrap()
        );

        // Before the lease expires the item is neither ready nor lockable.
        assert!(pending_ready(&db, now, 10).await.unwrap().is_empty());

        // After the lease expires it shows up for reclaim, and the lock
        // succeeds with the bumped version.
        let later = now + Duration::seconds(31);
        let ready = pending_ready(&db, later, 10).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].version, 1);
        assert!(
            try_lock_item(&db, "user-1", &item.id, 1, later + Duration::seconds(30), later)
                .await
                .unwrap()
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_item_rewrites_live_fields() {
        let (db, _dir) = setup_db().await;
        let mut item = make_item("user-1");
        put_item(&db, &item).await.unwrap();

        item.status = QueueStatus::Failed;
        item.retry_count = 3;
        item.next_retry_at = None;
        item.last_error = Some("503 Service Unavailable".to_string());
        item.version += 1;
        update_item(&db, &item).await.unwrap();

        let retrieved = get_item(&db, "user-1", &item.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, QueueStatus::Failed);
        assert_eq!(retrieved.retry_count, 3);
        assert!(retrieved.next_retry_at.is_none());
        assert_eq!(retrieved.last_error.as_deref(), Some("503 Service Unavailable"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn latest_for_identity_returns_most_recent() {
        let (db, _dir) = setup_db().await;
        let mut older = make_item("user-1");
        older.updated_at = Utc::now() - Duration::minutes(5);
        put_item(&db, &older).await.unwrap();
        let newer = make_item("user-1");
        put_item(&db, &newer).await.unwrap();

        let latest = latest_for_identity(&db, "user-1").await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert!(latest_for_identity(&db, "user-2").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_terminal_items() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let mut expired_done = make_item("user-1");
        expired_done.status = QueueStatus::Completed;
        expired_done.expires_at = now - Duration::hours(1);
        put_item(&db, &expired_done).await.unwrap();

        let mut expired_pending = make_item("user-1");
        expired_pending.expires_at = now - Duration::hours(1);
        put_item(&db, &expired_pending).await.unwrap();

        let fresh_done = {
            let mut it = make_item("user-1");
            it.status = QueueStatus::Failed;
            it
        };
        put_item(&db, &fresh_done).await.unwrap();

        let swept = sweep_expired_items(&db, now).await.unwrap();
        assert_eq!(swept, 1, "only terminal + expired items are collected");
        assert!(get_item(&db, "user-1", &expired_done.id).await.unwrap().is_none());
        assert!(get_item(&db, "user-1", &expired_pending.id).await.unwrap().is_some());
        assert!(get_item(&db, "user-1", &fresh_done.id).await.unwrap().is_some());
        db.close().await.unwrap();
    }
}
