//! SQLite-backed record store for documents and the admin credentials row.
//!
//! The store owns a single connection, so every read and write is serialized.
//! Lifecycle transitions are conditional updates: the caller learns from the
//! returned flag whether the row was still in the expected state.

pub mod schema;

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DocError, Result};
use crate::model::{Document, DocumentDraft, ListFilter, SignedFields};

const DB_FILE: &str = "app.db";

const COLUMNS: &str = "id, title, description, tags, original_name, original_path, ip_whitelist, \
     is_signed, signed_name, signed_path, signed_at, signed_by_metadata, signed_by_ip, remarks, \
     deleted, deleted_at, created_at, updated_at";

const LIVE_FILTER: &str = "deleted = 0 \
     AND (?1 IS NULL OR is_signed = ?1) \
     AND (?2 IS NULL OR instr(title, ?2) > 0 OR instr(description, ?2) > 0 OR instr(original_name, ?2) > 0)";

pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    /// Open (or create) `<data_dir>/app.db`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| DocError::storage("Could not create data directory", e))?;
        let path = data_dir.join(DB_FILE);
        info!("Opening SQLite database at {:?}", path);
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Whether admin credentials have been provisioned.
    pub fn is_initialized(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Password hash stored for `email`, if that is the admin login.
    pub fn password_hash(&self, email: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let hash = conn
            .query_row(
                "SELECT login_password_hash FROM settings WHERE login_email = ?1",
                [email],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Write the singleton credentials row. Returns `false` if it already exists.
    pub fn init_credentials(&self, email: &str, password_hash: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let exists: i64 = tx.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;
        if exists > 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO settings (id, login_email, login_password_hash) VALUES (1, ?1, ?2)",
            params![email, password_hash],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn insert(&self, doc: &Document) -> Result<()> {
        let tags = to_json(&doc.tags)?;
        let whitelist = to_json(&doc.ip_whitelist)?;
        let conn = self.conn.lock();
        conn.execute(
            &format!("INSERT INTO documents ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"),
            params![
                doc.id.to_string(),
                doc.title,
                doc.description,
                tags,
                doc.original_name,
                doc.original_path,
                whitelist,
                doc.is_signed,
                doc.signed_name,
                doc.signed_path,
                doc.signed_at,
                doc.signed_by_metadata,
                doc.signed_by_ip,
                doc.remarks,
                doc.deleted,
                doc.deleted_at,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Look a record up by id. Soft-deleted rows are only returned with
    /// `include_deleted`.
    pub fn find(&self, id: Uuid, include_deleted: bool) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM documents WHERE id = ?1 AND (?2 OR deleted = 0)"),
                params![id.to_string(), include_deleted],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// One page of live documents, newest first, plus the total match count.
    pub fn list(&self, filter: &ListFilter) -> Result<(Vec<Document>, u64)> {
        let conn = self.conn.lock();
        let keyword = filter.keyword.as_deref();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {LIVE_FILTER}"),
            params![filter.signed, keyword],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM documents WHERE {LIVE_FILTER} \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let docs = stmt
            .query_map(
                params![
                    filter.signed,
                    keyword,
                    i64::from(filter.limit),
                    filter.offset() as i64
                ],
                row_to_document,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((docs, total as u64))
    }

    /// Replace editable metadata and the original file of a live record.
    /// Returns `false` when no live row has this id.
    pub fn update_original(
        &self,
        id: Uuid,
        draft: &DocumentDraft,
        original_name: &str,
        original_path: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tags = to_json(&draft.tags)?;
        let whitelist = to_json(&draft.ip_whitelist)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET \
                 title = ?1, description = ?2, tags = ?3, original_name = ?4, \
                 original_path = ?5, ip_whitelist = ?6, updated_at = ?7 \
             WHERE id = ?8 AND deleted = 0",
            params![
                draft.title,
                draft.description,
                tags,
                original_name,
                original_path,
                whitelist,
                now,
                id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Flag a live record as deleted. Returns `false` if it is missing or
    /// already deleted.
    pub fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET deleted = 1, deleted_at = ?1, updated_at = ?1 \
             WHERE id = ?2 AND deleted = 0",
            params![now, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Transition an unsigned, live record to signed. Exactly one caller can
    /// win this for a given id; everyone else gets `false`.
    pub fn mark_signed(&self, id: Uuid, fields: &SignedFields) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET \
                 is_signed = 1, signed_name = ?1, signed_path = ?2, signed_at = ?3, \
                 signed_by_metadata = ?4, remarks = ?5, signed_by_ip = ?6, updated_at = ?3 \
             WHERE id = ?7 AND is_signed = 0 AND deleted = 0",
            params![
                fields.signed_name,
                fields.signed_path,
                fields.signed_at,
                fields.signed_by_metadata,
                fields.remarks,
                fields.signed_by_ip,
                id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

fn to_json(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| DocError::storage("Could not encode list", e))
}

fn json_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    Ok(Document {
        id,
        title: row.get(1)?,
        description: row.get(2)?,
        tags: json_list(row, 3)?,
        original_name: row.get(4)?,
        original_path: row.get(5)?,
        ip_whitelist: json_list(row, 6)?,
        is_signed: row.get(7)?,
        signed_name: row.get(8)?,
        signed_path: row.get(9)?,
        signed_at: row.get(10)?,
        signed_by_metadata: row.get(11)?,
        signed_by_ip: row.get(12)?,
        remarks: row.get(13)?,
        deleted: row.get(14)?,
        deleted_at: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
