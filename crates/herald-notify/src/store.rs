//! SQLite-backed notification store — the single source of truth shared
//! by the scheduling and dispatching processes.
//!
//! All status transitions are atomic compare-and-set updates, so two
//! dispatcher instances polling the same file never both claim one row.
//! Timestamps are UNIX seconds (UTC) so due-ness is a plain integer
//! comparison in SQL.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, TransactionBehavior};

use herald_core::error::{HeraldError, Result};
use herald_core::types::{Anchor, NewNotification, Notification, NotificationStatus};

/// Durable, concurrently-accessible table of pending/sent notifications.
pub struct NotificationStore {
    conn: Mutex<Connection>,
}

const SELECT_COLS: &str = "id, event_id, profile, category, title, anchor, offset_minutes, \
     fire_at, event_time, template_key, phase, sub_item, custom_message, status, claimed_at";

impl NotificationStore {
    /// Open or create the store database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| HeraldError::Store(format!("open: {e}")))?;
        // Cross-process writers share this file; let readers wait briefly
        // instead of failing on a held write lock.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| HeraldError::Store(format!("busy_timeout: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create the schema. Idempotent.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                profile TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                anchor TEXT NOT NULL,                 -- 'start' | 'end'
                offset_minutes INTEGER NOT NULL DEFAULT 0,
                fire_at INTEGER NOT NULL,             -- unix seconds, UTC
                event_time INTEGER NOT NULL,          -- anchor instant, unix seconds
                template_key TEXT NOT NULL,
                phase TEXT NOT NULL DEFAULT '',       -- '' = none
                sub_item TEXT NOT NULL DEFAULT '',    -- '' = none
                custom_message TEXT,
                status TEXT NOT NULL DEFAULT 'pending',  -- pending, claimed, sent
                claimed_at INTEGER
            );

            -- One row per timing identity; '' sentinels keep NULL-distinct
            -- semantics out of the index.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_notif_identity
                ON notifications(event_id, anchor, offset_minutes, phase, sub_item);

            CREATE INDEX IF NOT EXISTS idx_notif_due ON notifications(status, fire_at);
            CREATE INDEX IF NOT EXISTS idx_notif_event ON notifications(event_id);
            ",
        )
        .map_err(|e| HeraldError::Store(format!("migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HeraldError::Store(format!("lock poisoned: {e}")))
    }

    // ─── Scheduling writes ──────────────────────────────────────

    /// Insert or replace one row by its timing identity. A `sent` row with
    /// the same identity is left untouched (audit trail). Profiles are
    /// stored uppercased so the profile filters match any input casing.
    pub fn upsert(&self, row: &NewNotification) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications
                 (event_id, profile, category, title, anchor, offset_minutes,
                  fire_at, event_time, template_key, phase, sub_item, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending')
             ON CONFLICT(event_id, anchor, offset_minutes, phase, sub_item) DO UPDATE SET
                 profile = excluded.profile,
                 category = excluded.category,
                 title = excluded.title,
                 fire_at = excluded.fire_at,
                 event_time = excluded.event_time,
                 template_key = excluded.template_key,
                 status = 'pending',
                 claimed_at = NULL
             WHERE notifications.status != 'sent'",
            rusqlite::params![
                row.event_id,
                row.profile.to_uppercase(),
                row.category,
                row.title,
                row.anchor.as_str(),
                row.offset_minutes,
                row.fire_at,
                row.event_time,
                row.template_key,
                row.phase.as_deref().unwrap_or(""),
                row.sub_item.as_deref().unwrap_or(""),
            ],
        )
        .map_err(|e| HeraldError::Store(format!("upsert: {e}")))?;
        Ok(())
    }

    /// Replace the full notification set for an event in one transaction:
    /// delete every non-sent row, insert the new set. Sent rows survive as
    /// audit copies and shadow identical re-inserts. All or nothing.
    pub fn replace_for_event(&self, event_id: &str, rows: &[NewNotification]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| HeraldError::Store(format!("begin: {e}")))?;

        tx.execute(
            "DELETE FROM notifications WHERE event_id = ?1 AND status != 'sent'",
            [event_id],
        )
        .map_err(|e| HeraldError::Store(format!("replace delete: {e}")))?;

        let mut inserted = 0;
        for row in rows {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO notifications
                         (event_id, profile, category, title, anchor, offset_minutes,
                          fire_at, event_time, template_key, phase, sub_item, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending')",
                    rusqlite::params![
                        row.event_id,
                        row.profile.to_uppercase(),
                        row.category,
                        row.title,
                        row.anchor.as_str(),
                        row.offset_minutes,
                        row.fire_at,
                        row.event_time,
                        row.template_key,
                        row.phase.as_deref().unwrap_or(""),
                        row.sub_item.as_deref().unwrap_or(""),
                    ],
                )
                .map_err(|e| HeraldError::Store(format!("replace insert: {e}")))?;
        }

        tx.commit()
            .map_err(|e| HeraldError::Store(format!("commit: {e}")))?;
        Ok(inserted)
    }

    /// Remove all pending/claimed rows for an event. Sent rows are never
    /// deleted here — they are the audit trail.
    pub fn delete_for_event(&self, event_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM notifications WHERE event_id = ?1 AND status != 'sent'",
                [event_id],
            )
            .map_err(|e| HeraldError::Store(format!("delete_for_event: {e}")))?;
        Ok(n)
    }

    // ─── Dispatcher transitions ──────────────────────────────────────

    /// Atomically claim up to `limit` due pending rows. The select and the
    /// per-row compare-and-set run inside one IMMEDIATE transaction, so
    /// concurrent claimers (other threads or other processes) never both
    /// receive the same row.
    pub fn claim_due(&self, now: i64, limit: usize) -> Result<Vec<Notification>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| HeraldError::Store(format!("begin: {e}")))?;

        let ids: Vec<i64> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM notifications
                     WHERE status = 'pending' AND fire_at <= ?1
                     ORDER BY fire_at ASC LIMIT ?2",
                )
                .map_err(|e| HeraldError::Store(format!("claim select: {e}")))?;
            let rows = stmt
                .query_map(rusqlite::params![now, limit as i64], |row| row.get(0))
                .map_err(|e| HeraldError::Store(format!("claim query: {e}")))?;
            rows.filter_map(|r| r.ok()).collect()
        };

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let changed = tx
                .execute(
                    "UPDATE notifications SET status = 'claimed', claimed_at = ?1
                     WHERE id = ?2 AND status = 'pending'",
                    rusqlite::params![now, id],
                )
                .map_err(|e| HeraldError::Store(format!("claim update: {e}")))?;
            if changed == 1 {
                let row = tx
                    .query_row(
                        &format!("SELECT {SELECT_COLS} FROM notifications WHERE id = ?1"),
                        [id],
                        row_to_notification,
                    )
                    .map_err(|e| HeraldError::Store(format!("claim readback: {e}")))?;
                claimed.push(row);
            }
        }

        tx.commit()
            .map_err(|e| HeraldError::Store(format!("commit: {e}")))?;
        Ok(claimed)
    }

    /// claimed → sent. Returns false if the row was not claimed (already
    /// finalized, released, or rescheduled meanwhile).
    pub fn finalize_sent(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE notifications SET status = 'sent', claimed_at = NULL
                 WHERE id = ?1 AND status = 'claimed'",
                [id],
            )
            .map_err(|e| HeraldError::Store(format!("finalize: {e}")))?;
        Ok(n == 1)
    }

    /// claimed → pending, on delivery failure. The row is still due and
    /// retries naturally on the next poll cycle.
    pub fn release(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE notifications SET status = 'pending', claimed_at = NULL
                 WHERE id = ?1 AND status = 'claimed'",
                [id],
            )
            .map_err(|e| HeraldError::Store(format!("release: {e}")))?;
        Ok(n == 1)
    }

    /// Recover from a dispatcher crash mid-delivery: any claim older than
    /// `older_than` goes back to pending. Sent rows are never touched.
    pub fn reap_stale_claims(&self, older_than: i64) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE notifications SET status = 'pending', claimed_at = NULL
                 WHERE status = 'claimed' AND claimed_at IS NOT NULL AND claimed_at < ?1",
                [older_than],
            )
            .map_err(|e| HeraldError::Store(format!("reap: {e}")))?;
        Ok(n)
    }

    // ─── Management queries ──────────────────────────────────────

    /// All rows for an event, soonest first (management/display surface).
    pub fn list_for_event(&self, event_id: &str) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLS} FROM notifications
                 WHERE event_id = ?1 ORDER BY fire_at ASC"
            ))
            .map_err(|e| HeraldError::Store(format!("list_for_event: {e}")))?;
        let rows = stmt
            .query_map([event_id], row_to_notification)
            .map_err(|e| HeraldError::Store(format!("list_for_event: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All unsent rows, optionally filtered by profile, soonest first.
    pub fn list_pending(&self, profile: Option<&str>) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let (sql, arg) = match profile {
            Some(p) => (
                format!(
                    "SELECT {SELECT_COLS} FROM notifications
                     WHERE status != 'sent' AND profile = ?1 ORDER BY fire_at ASC"
                ),
                p.to_uppercase(),
            ),
            None => (
                format!(
                    "SELECT {SELECT_COLS} FROM notifications
                     WHERE status != 'sent' ORDER BY fire_at ASC"
                ),
                String::new(),
            ),
        };
        let mut stmt = stmt_err(conn.prepare(&sql))?;
        let rows = if profile.is_some() {
            stmt_err(stmt.query_map([arg], row_to_notification))?
                .filter_map(|r| r.ok())
                .collect()
        } else {
            stmt_err(stmt.query_map([], row_to_notification))?
                .filter_map(|r| r.ok())
                .collect()
        };
        Ok(rows)
    }

    /// Count of unsent rows, optionally per profile.
    pub fn count_pending(&self, profile: Option<&str>) -> Result<i64> {
        let conn = self.lock()?;
        let count = match profile {
            Some(p) => conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE status != 'sent' AND profile = ?1",
                [p.to_uppercase()],
                |r| r.get(0),
            ),
            None => conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE status != 'sent'",
                [],
                |r| r.get(0),
            ),
        };
        count.map_err(|e| HeraldError::Store(format!("count_pending: {e}")))
    }

    /// Distinct event ids that still have unsent rows.
    pub fn pending_event_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = stmt_err(conn.prepare(
            "SELECT DISTINCT event_id FROM notifications WHERE status != 'sent'",
        ))?;
        let rows = stmt_err(stmt.query_map([], |row| row.get(0)))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Fetch one row by id.
    pub fn get(&self, id: i64) -> Result<Option<Notification>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLS} FROM notifications WHERE id = ?1"),
                [id],
                row_to_notification,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(HeraldError::Store(format!("get: {other}"))),
            })?;
        Ok(row)
    }

    /// Manual removal of a single scheduled notification. Refuses to
    /// delete a sent row.
    pub fn delete_one(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM notifications WHERE id = ?1 AND status != 'sent'",
                [id],
            )
            .map_err(|e| HeraldError::Store(format!("delete_one: {e}")))?;
        Ok(n == 1)
    }

    /// Set or clear the custom-message override on one unsent notification.
    pub fn set_custom_message(&self, id: i64, message: Option<&str>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE notifications SET custom_message = ?1
                 WHERE id = ?2 AND status != 'sent'",
                rusqlite::params![message, id],
            )
            .map_err(|e| HeraldError::Store(format!("set_custom_message: {e}")))?;
        Ok(n == 1)
    }

    /// Trim the audit trail: delete sent rows that fired before `cutoff`.
    pub fn purge_sent_before(&self, cutoff: i64) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM notifications WHERE status = 'sent' AND fire_at < ?1",
                [cutoff],
            )
            .map_err(|e| HeraldError::Store(format!("purge_sent: {e}")))?;
        Ok(n)
    }
}

fn stmt_err<T>(r: rusqlite::Result<T>) -> Result<T> {
    r.map_err(|e| HeraldError::Store(format!("query: {e}")))
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let anchor: String = row.get(5)?;
    let phase: String = row.get(10)?;
    let sub_item: String = row.get(11)?;
    let status: String = row.get(13)?;
    Ok(Notification {
        id: row.get(0)?,
        event_id: row.get(1)?,
        profile: row.get(2)?,
        category: row.get(3)?,
        title: row.get(4)?,
        anchor: Anchor::from_str(&anchor),
        offset_minutes: row.get(6)?,
        fire_at: row.get(7)?,
        event_time: row.get(8)?,
        template_key: row.get(9)?,
        phase: if phase.is_empty() { None } else { Some(phase) },
        sub_item: if sub_item.is_empty() {
            None
        } else {
            Some(sub_item)
        },
        custom_message: row.get(12)?,
        status: NotificationStatus::from_str(&status),
        claimed_at: row.get(14)?,
    })
}
