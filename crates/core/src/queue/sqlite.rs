//! SQLite-backed work queue. Leases are stored as epoch-millisecond deadlines.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::delivery_token;
use super::{Delivery, QueueError, WorkItem, WorkQueue};

/// Durable work queue in a SQLite table.
pub struct SqliteWorkQueue {
    lease: Duration,
    conn: Mutex<Connection>,
}

impl SqliteWorkQueue {
    pub fn new(path: &Path, lease: Duration) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            lease,
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory(lease: Duration) -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            lease,
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS work_items (
                task_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                delivery_count INTEGER NOT NULL DEFAULT 0,
                delivery_id TEXT,
                leased_until INTEGER,
                enqueued_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_work_items_visible ON work_items(leased_until, enqueued_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Storage("connection lock poisoned".to_string()))
    }

    fn lease_millis(&self) -> i64 {
        i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn enqueue(&self, item: WorkItem) -> Result<bool, QueueError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO work_items (task_id, document_id, owner_id, attempt, enqueued_at) VALUES (?, ?, ?, ?, ?)",
            params![
                item.task_id(),
                item.document_id,
                item.owner_id,
                item.attempt,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(inserted > 0)
    }

    async fn claim(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();

        let row = tx
            .query_row(
                "SELECT task_id, document_id, owner_id, attempt, delivery_count FROM work_items
                 WHERE leased_until IS NULL OR leased_until <= ?
                 ORDER BY enqueued_at ASC, rowid ASC LIMIT 1",
                params![now],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        WorkItem {
                            document_id: row.get(1)?,
                            owner_id: row.get(2)?,
                            attempt: row.get(3)?,
                        },
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((task_id, item, delivery_count)) = row else {
            return Ok(None);
        };

        let delivery_count = delivery_count + 1;
        let delivery_id = delivery_token(&task_id, delivery_count);
        tx.execute(
            "UPDATE work_items SET leased_until = ?, delivery_count = ?, delivery_id = ? WHERE task_id = ?",
            params![
                now.saturating_add(self.lease_millis()),
                delivery_count,
                delivery_id,
                task_id
            ],
        )?;
        tx.commit()?;

        Ok(Some(Delivery {
            delivery_id,
            item,
            delivery_count,
        }))
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM work_items WHERE delivery_id = ?",
            params![delivery_id],
        )?;
        if deleted == 0 {
            return Err(QueueError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }

    async fn nack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE work_items SET leased_until = NULL, delivery_id = NULL WHERE delivery_id = ?",
            params![delivery_id],
        )?;
        if updated == 0 {
            return Err(QueueError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }

    async fn extend(&self, delivery_id: &str) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let leased_until = Utc::now()
            .timestamp_millis()
            .saturating_add(self.lease_millis());
        let updated = conn.execute(
            "UPDATE work_items SET leased_until = ? WHERE delivery_id = ?",
            params![leased_until, delivery_id],
        )?;
        if updated == 0 {
            return Err(QueueError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM work_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn lease(&self) -> Duration {
        self.lease
    }
}
