//! SQLite-backed metadata store for model records

use crate::error::{GgufError, GgufResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS models (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    source_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_size TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_used TEXT
);
";

const SELECT_COLUMNS: &str =
    "SELECT id, slug, source_id, file_name, file_path, file_size, created_at, last_used FROM models";

/// One locally known model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub id: i64,
    /// User-facing handle, unique across records
    pub slug: String,
    /// Hub identifier (`namespace/name`)
    pub source_id: String,
    pub file_name: String,
    pub file_path: PathBuf,
    /// Human-readable size such as `812M`
    pub file_size: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Fields supplied when inserting or replacing a record
#[derive(Debug, Clone)]
pub struct NewModel<'a> {
    pub slug: &'a str,
    pub source_id: &'a str,
    pub file_name: &'a str,
    pub file_path: &'a Path,
    pub file_size: &'a str,
}

/// Single-table record store
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> GgufResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = ?path, "Metadata store opened");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a throwaway store that lives only as long as the value
    pub fn open_in_memory() -> GgufResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    /// Backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the connection, surfacing any error from the final flush
    pub fn close(self) -> GgufResult<()> {
        self.conn.close().map_err(|(_, e)| GgufError::Store(e))
    }

    pub fn get(&self, slug: &str) -> GgufResult<ModelRecord> {
        let sql = format!("{} WHERE slug = ?1", SELECT_COLUMNS);
        self.conn
            .query_row(&sql, params![slug], row_to_record)
            .optional()?
            .ok_or_else(|| GgufError::not_found_slug(slug))
    }

    /// All records, most recently used first, then newest first
    pub fn list(&self) -> GgufResult<Vec<ModelRecord>> {
        let sql = format!("{} ORDER BY last_used DESC, created_at DESC, id DESC", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_record)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Mark a record as used now
    pub fn touch(&self, slug: &str) -> GgufResult<()> {
        let changed = self.conn.execute(
            "UPDATE models SET last_used = ?1 WHERE slug = ?2",
            params![format_timestamp(Utc::now()), slug],
        )?;
        if changed == 0 {
            return Err(GgufError::not_found_slug(slug));
        }
        Ok(())
    }

    /// Insert a record, replacing any existing record with the same slug
    pub fn upsert(&self, model: &NewModel<'_>) -> GgufResult<ModelRecord> {
        self.conn.execute(
            "INSERT OR REPLACE INTO models (slug, source_id, file_name, file_path, file_size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                model.slug,
                model.source_id,
                model.file_name,
                model.file_path.to_string_lossy(),
                model.file_size,
                format_timestamp(Utc::now()),
            ],
        )?;

        tracing::debug!(slug = %model.slug, source_id = %model.source_id, "Model record upserted");

        self.get(model.slug)
    }

    pub fn remove(&self, slug: &str) -> GgufResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM models WHERE slug = ?1", params![slug])?;
        if changed == 0 {
            return Err(GgufError::not_found_slug(slug));
        }
        Ok(())
    }

    /// Rewrite a record's slug, keeping every other field
    pub fn rename(&self, old: &str, new: &str) -> GgufResult<()> {
        if old != new && self.exists(new)? {
            return Err(GgufError::Conflict(format!(
                "model with slug '{}' already exists",
                new
            )));
        }

        let changed = self.conn.execute(
            "UPDATE models SET slug = ?1 WHERE slug = ?2",
            params![new, old],
        )?;
        if changed == 0 {
            return Err(GgufError::not_found_slug(old));
        }
        Ok(())
    }

    pub fn exists(&self, slug: &str) -> GgufResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM models WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// First record whose file path ends with `file_name`
    pub fn find_by_file_name(&self, file_name: &str) -> GgufResult<Option<ModelRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|r| r.file_path.to_string_lossy().ends_with(file_name)))
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    // Fixed width so that lexical ORDER BY matches chronological order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ModelRecord> {
    let file_path: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let last_used: Option<String> = row.get(7)?;

    Ok(ModelRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        source_id: row.get(2)?,
        file_name: row.get(3)?,
        file_path: PathBuf::from(file_path),
        file_size: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
        last_used: last_used.map(|s| parse_timestamp(7, &s)).transpose()?,
    })
}
