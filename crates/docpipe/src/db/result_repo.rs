//! Result repository: stored envelopes, error records and the pipeline
//! configuration row.

use rusqlite::{params, OptionalExtension, Row};

use super::{ResultDb, ResultDbError};

/// A stored envelope. `body` is the serialized envelope JSON.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub pipeline: String,
    pub id: String,
    pub filename: Option<String>,
    pub kind: String,
    pub label: Option<String>,
    pub body: String,
    pub updated_at: String,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            pipeline: row.get("pipeline")?,
            id: row.get("id")?,
            filename: row.get("filename")?,
            kind: row.get("kind")?,
            label: row.get("label")?,
            body: row.get("body")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ErrorRow {
    /// Same shape as the blob key: `error/{pipeline}/{id}_error.json`.
    pub key: String,
    pub pipeline: String,
    pub document_id: Option<String>,
    pub message: String,
    pub body: String,
    pub created_at: String,
}

impl ErrorRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            key: row.get("key")?,
            pipeline: row.get("pipeline")?,
            document_id: row.get("document_id")?,
            message: row.get("message")?,
            body: row.get("body")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts or replaces the result stored under `(pipeline, id)`.
pub fn upsert_result(db: &ResultDb, result: &ResultRow) -> Result<(), ResultDbError> {
    db.call(|conn| {
        conn.execute(
            "INSERT INTO results (pipeline, id, filename, kind, label, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (pipeline, id) DO UPDATE SET
                filename = excluded.filename,
                kind = excluded.kind,
                label = excluded.label,
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![
                result.pipeline,
                result.id,
                result.filename,
                result.kind,
                result.label,
                result.body,
                result.updated_at,
            ],
        )?;
        log::debug!("Stored result {}/{}", result.pipeline, result.id);
        Ok(())
    })
}

pub fn get_result(db: &ResultDb, pipeline: &str, id: &str) -> Result<Option<ResultRow>, ResultDbError> {
    db.call(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM results WHERE pipeline = ?1 AND id = ?2",
                params![pipeline, id],
                ResultRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns true if a row was deleted.
pub fn delete_result(db: &ResultDb, pipeline: &str, id: &str) -> Result<bool, ResultDbError> {
    db.call(|conn| {
        let deleted = conn.execute(
            "DELETE FROM results WHERE pipeline = ?1 AND id = ?2",
            params![pipeline, id],
        )?;
        Ok(deleted > 0)
    })
}

pub fn list_results(db: &ResultDb, pipeline: &str) -> Result<Vec<ResultRow>, ResultDbError> {
    db.call(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM results WHERE pipeline = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![pipeline], ResultRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn insert_error(db: &ResultDb, error: &ErrorRow) -> Result<(), ResultDbError> {
    db.call(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO errors (key, pipeline, document_id, message, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                error.key,
                error.pipeline,
                error.document_id,
                error.message,
                error.body,
                error.created_at,
            ],
        )?;
        log::warn!("Recorded error {}: {}", error.key, error.message);
        Ok(())
    })
}

pub fn list_errors(db: &ResultDb, pipeline: &str) -> Result<Vec<ErrorRow>, ResultDbError> {
    db.call(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM errors WHERE pipeline = ?1 ORDER BY created_at, key")?;
        let rows = stmt
            .query_map(params![pipeline], ErrorRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn put_config(db: &ResultDb, body: &str, updated_at: &str) -> Result<(), ResultDbError> {
    db.call(|conn| {
        conn.execute(
            "INSERT INTO pipeline_config (singleton, body, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT (singleton) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![body, updated_at],
        )?;
        Ok(())
    })
}

pub fn get_config(db: &ResultDb) -> Result<Option<String>, ResultDbError> {
    db.call(|conn| {
        let body = conn
            .query_row(
                "SELECT body FROM pipeline_config WHERE singleton = 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(body)
    })
}
