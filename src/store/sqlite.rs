use super::{check_field_name, RecordStore, COLLECTION};
use crate::error::StoreError;
use crate::record::{Document, StoredRecord};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn select_where(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let sql = format!(
            "SELECT id, doc, created_at FROM {COLLECTION} {filter} ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, doc, created_at)| -> Result<StoredRecord, StoreError> {
                Ok(StoredRecord {
                    id,
                    created_at: created_at.unwrap_or_default(),
                    document: serde_json::from_str(&doc)?,
                })
            })
            .collect()
    }
}

/// Database file for a project: `<workspace>/<project_id>.sqlite3`.
pub fn store_path(workspace: &Path, project_id: &str) -> PathBuf {
    let stem: String = project_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    workspace.join(format!("{stem}.sqlite3"))
}

pub fn open_store(workspace: &Path, project_id: &str) -> anyhow::Result<SqliteStore> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let path = store_path(workspace, project_id);
    let conn = Connection::open(&path)
        .with_context(|| format!("failed to open database {}", path.to_string_lossy()))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    // Databases created before listings showed timestamps lack created_at.
    ensure_users_created_at(&conn)?;
    // Must stay textually identical to the expression in query_equals("number").
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_number ON users(json_extract(doc, '$.number'))",
        [],
    )?;

    tracing::info!(path = %path.to_string_lossy(), "record store opened");
    Ok(SqliteStore { conn, path })
}

fn ensure_users_created_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, COLLECTION, "created_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN created_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

impl RecordStore for SqliteStore {
    fn add(&mut self, document: &Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let doc = serde_json::to_string(document)?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.conn.execute(
            "INSERT INTO users(id, doc, created_at) VALUES(?, ?, ?)",
            (&id, &doc, &created_at),
        )?;
        tracing::debug!(record_id = %id, "record added");
        Ok(id)
    }

    fn stream_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        self.select_where("", &[])
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        tracing::debug!(record_id = %id, "record deleted");
        Ok(())
    }

    fn query_equals(&self, field: &str, value: &str) -> Result<Vec<StoredRecord>, StoreError> {
        check_field_name(field)?;
        // Field names are word characters only, so inlining the JSON path is safe
        // and lets SQLite match the expression index.
        let filter = format!("WHERE json_extract(doc, '$.{field}') = ?");
        self.select_where(&filter, &[&value as &dyn rusqlite::ToSql])
    }
}
