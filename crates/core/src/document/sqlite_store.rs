//! SQLite-backed document store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Batch, CreateBatchRequest, CreateDocumentRequest, Document, DocumentFilter, DocumentOutcome,
    DocumentStatus, DocumentStore, StoreError,
};

const DOCUMENT_COLUMNS: &str = "id, batch_id, owner_id, storage_key, filename, mime_type, status, error_message, match_score, match_rationale, structured_record, attempt, created_at, processed_at, updated_at";

const BATCH_COLUMNS: &str =
    "id, owner_id, title, requirement, total, processed, failed, created_at, updated_at";

/// SQLite-backed document and batch store.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database file and tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                requirement TEXT,
                total INTEGER NOT NULL DEFAULT 0,
                processed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (processed >= 0 AND failed >= 0 AND processed + failed <= total)
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL REFERENCES batches(id),
                owner_id TEXT NOT NULL,
                storage_key TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                match_score INTEGER,
                match_rationale TEXT,
                structured_record TEXT,
                attempt INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                processed_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_batch_status ON documents(batch_id, status);
            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
            CREATE INDEX IF NOT EXISTS idx_batches_owner ON batches(owner_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// Read-modify-write one document inside a transaction.
    fn with_document<F>(&self, id: &str, f: F) -> Result<Document, StoreError>
    where
        F: FnOnce(&Connection, &mut Document) -> Result<(), StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut document =
            read_document(&tx, id)?.ok_or_else(|| StoreError::document_not_found(id))?;
        f(&tx, &mut document)?;
        write_document(&tx, &document)?;

        tx.commit()?;
        Ok(document)
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let status_str: String = row.get(6)?;
    let status = status_str.parse::<DocumentStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
    })?;

    let record_json: Option<String> = row.get(10)?;
    let created_at: String = row.get(12)?;
    let processed_at: Option<String> = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Document {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        owner_id: row.get(2)?,
        storage_key: row.get(3)?,
        filename: row.get(4)?,
        mime_type: row.get(5)?,
        status,
        error_message: row.get(7)?,
        match_score: row.get(8)?,
        match_rationale: row.get(9)?,
        structured_record: record_json.and_then(|json| serde_json::from_str(&json).ok()),
        attempt: row.get(11)?,
        created_at: parse_timestamp(&created_at),
        processed_at: processed_at.as_deref().map(parse_timestamp),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<Batch> {
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Batch {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        requirement: row.get(3)?,
        total: row.get(4)?,
        processed: row.get(5)?,
        failed: row.get(6)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn read_document(conn: &Connection, id: &str) -> Result<Option<Document>, StoreError> {
    let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], row_to_document)
        .optional()?)
}

fn read_batch(conn: &Connection, id: &str) -> Result<Option<Batch>, StoreError> {
    let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_batch).optional()?)
}

fn write_document(conn: &Connection, document: &Document) -> Result<(), StoreError> {
    let record_json = document
        .structured_record
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    conn.execute(
        "UPDATE documents SET status = ?, error_message = ?, match_score = ?, match_rationale = ?, structured_record = ?, attempt = ?, processed_at = ?, updated_at = ? WHERE id = ?",
        params![
            document.status.as_str(),
            document.error_message,
            document.match_score,
            document.match_rationale,
            record_json,
            document.attempt,
            document.processed_at.as_ref().map(timestamp),
            timestamp(&document.updated_at),
            document.id,
        ],
    )?;
    Ok(())
}

/// Apply counter deltas in one statement so the CHECK constraint sees the final row.
fn adjust_batch(
    conn: &Connection,
    batch_id: &str,
    total: i64,
    processed: i64,
    failed: i64,
) -> Result<(), StoreError> {
    let updated = conn.execute(
        "UPDATE batches SET total = total + ?, processed = processed + ?, failed = failed + ?, updated_at = ? WHERE id = ?",
        params![total, processed, failed, timestamp(&Utc::now()), batch_id],
    )?;
    if updated == 0 {
        return Err(StoreError::batch_not_found(batch_id));
    }
    Ok(())
}

fn check_attempt(document: &Document, attempt: u32) -> Result<(), StoreError> {
    if document.attempt != attempt {
        return Err(StoreError::StaleAttempt {
            document_id: document.id.clone(),
            expected: attempt,
            current: document.attempt,
        });
    }
    Ok(())
}

impl DocumentStore for SqliteDocumentStore {
    fn create_batch(&self, request: CreateBatchRequest) -> Result<Batch, StoreError> {
        let conn = self.lock()?;

        let now = Utc::now();
        let batch = Batch {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: request.owner_id,
            title: request.title,
            requirement: request.requirement,
            total: 0,
            processed: 0,
            failed: 0,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO batches (id, owner_id, title, requirement, total, processed, failed, created_at, updated_at) VALUES (?, ?, ?, ?, 0, 0, 0, ?, ?)",
            params![
                batch.id,
                batch.owner_id,
                batch.title,
                batch.requirement,
                timestamp(&now),
                timestamp(&now),
            ],
        )?;

        Ok(batch)
    }

    fn get_batch(&self, id: &str) -> Result<Option<Batch>, StoreError> {
        let conn = self.lock()?;
        read_batch(&conn, id)
    }

    fn list_batches(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Batch>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM batches WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            BATCH_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, limit, offset], row_to_batch)?;

        let mut batches = Vec::new();
        for row in rows {
            batches.push(row?);
        }
        Ok(batches)
    }

    fn delete_batch(&self, id: &str) -> Result<Vec<Document>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if read_batch(&tx, id)?.is_none() {
            return Err(StoreError::batch_not_found(id));
        }

        let documents = {
            let sql = format!(
                "SELECT {} FROM documents WHERE batch_id = ? ORDER BY created_at ASC, rowid ASC",
                DOCUMENT_COLUMNS
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params![id], row_to_document)?;
            let mut documents = Vec::new();
            for row in rows {
                documents.push(row?);
            }
            documents
        };

        let running = documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Processing)
            .count();
        if running > 0 {
            return Err(StoreError::Conflict(format!(
                "batch {} has {} document(s) being processed",
                id, running
            )));
        }

        tx.execute("DELETE FROM documents WHERE batch_id = ?", params![id])?;
        tx.execute("DELETE FROM batches WHERE id = ?", params![id])?;

        tx.commit()?;
        Ok(documents)
    }

    fn add_document(&self, request: CreateDocumentRequest) -> Result<Document, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let batch = read_batch(&tx, &request.batch_id)?
            .ok_or_else(|| StoreError::batch_not_found(&request.batch_id))?;

        let now = Utc::now();
        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.id,
            owner_id: batch.owner_id,
            storage_key: request.storage_key,
            filename: request.filename,
            mime_type: request.mime_type,
            status: DocumentStatus::Queued,
            error_message: None,
            match_score: None,
            match_rationale: None,
            structured_record: None,
            attempt: 0,
            created_at: now,
            processed_at: None,
            updated_at: now,
        };

        tx.execute(
            "INSERT INTO documents (id, batch_id, owner_id, storage_key, filename, mime_type, status, attempt, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
            params![
                document.id,
                document.batch_id,
                document.owner_id,
                document.storage_key,
                document.filename,
                document.mime_type,
                document.status.as_str(),
                timestamp(&now),
                timestamp(&now),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(format!(
                    "storage key already registered: {}",
                    document.storage_key
                ))
            }
            other => StoreError::from(other),
        })?;
        adjust_batch(&tx, &document.batch_id, 1, 0, 0)?;

        tx.commit()?;
        Ok(document)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        read_document(&conn, id)
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        let conn = self.lock()?;

        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref batch_id) = filter.batch_id {
            conditions.push("batch_id = ?".to_string());
            values.push(Box::new(batch_id.clone()));
        }

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push("owner_id = ?".to_string());
            values.push(Box::new(owner_id.clone()));
        }

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            conditions.push(format!("status IN ({})", placeholders));
            for status in &filter.statuses {
                values.push(Box::new(status.as_str()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM documents {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS, where_clause
        );

        values.push(Box::new(filter.limit));
        values.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), row_to_document)?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    fn claim_document(&self, id: &str, attempt: u32) -> Result<Document, StoreError> {
        self.with_document(id, |_, document| {
            check_attempt(document, attempt)?;
            if document.status == DocumentStatus::Processing {
                return Ok(());
            }
            document.apply(DocumentStatus::Processing, None)?;
            Ok(())
        })
    }

    fn complete_document(
        &self,
        id: &str,
        attempt: u32,
        outcome: DocumentOutcome,
    ) -> Result<Document, StoreError> {
        self.with_document(id, |conn, document| {
            check_attempt(document, attempt)?;
            document.apply(DocumentStatus::Completed, None)?;
            document.structured_record = Some(outcome.structured_record);
            document.match_score = outcome.match_score;
            document.match_rationale = outcome.match_rationale;
            adjust_batch(conn, &document.batch_id, 0, 1, 0)
        })
    }

    fn fail_document(
        &self,
        id: &str,
        attempt: u32,
        error: &str,
    ) -> Result<Document, StoreError> {
        self.with_document(id, |conn, document| {
            check_attempt(document, attempt)?;
            document.apply(DocumentStatus::Failed, Some(error.to_string()))?;
            adjust_batch(conn, &document.batch_id, 0, 0, 1)
        })
    }

    fn reset_for_retry(&self, id: &str) -> Result<Document, StoreError> {
        self.with_document(id, |conn, document| {
            document.apply(DocumentStatus::Queued, None)?;
            document.attempt += 1;
            adjust_batch(conn, &document.batch_id, 0, 0, -1)
        })
    }

    fn review_document(
        &self,
        id: &str,
        outcome: DocumentStatus,
    ) -> Result<Document, StoreError> {
        if !outcome.is_review_outcome() {
            return Err(StoreError::Conflict(format!(
                "{} is not a review outcome",
                outcome
            )));
        }
        self.with_document(id, |_, document| {
            document.apply(outcome, None)?;
            Ok(())
        })
    }

    fn delete_document(&self, id: &str) -> Result<Document, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let document =
            read_document(&tx, id)?.ok_or_else(|| StoreError::document_not_found(id))?;
        if document.status == DocumentStatus::Processing {
            return Err(StoreError::Conflict(format!(
                "document {} is being processed",
                id
            )));
        }

        let (processed, failed) = match document.status {
            DocumentStatus::Failed => (0, -1),
            DocumentStatus::Completed | DocumentStatus::Shortlisted | DocumentStatus::Rejected => {
                (-1, 0)
            }
            DocumentStatus::Queued | DocumentStatus::Processing => (0, 0),
        };

        tx.execute("DELETE FROM documents WHERE id = ?", params![id])?;
        adjust_batch(&tx, &document.batch_id, -1, processed, failed)?;

        tx.commit()?;
        Ok(document)
    }
}
