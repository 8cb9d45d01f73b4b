//! Typed query helpers for the journal tables.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::errors::{DatabaseError, SinkError};
use crate::model::{DirectiveKind, ResolutionRecord};
use crate::sink::ResolutionSink;

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row from the `resolutions` table.
#[derive(Debug, Clone)]
pub struct ResolutionEntry {
    pub id: String,
    pub dataset_id: String,
    pub dataset_type: String,
    pub directive: String,
    pub merged_payload: Option<String>,
    pub overwrite_local: bool,
    pub overwrite_remote: bool,
    pub resolved_at: String,
}

impl ResolutionEntry {
    pub fn directive_kind(&self) -> Option<DirectiveKind> {
        DirectiveKind::from_str_val(&self.directive)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            dataset_id: row.get(1)?,
            dataset_type: row.get(2)?,
            directive: row.get(3)?,
            merged_payload: row.get(4)?,
            overwrite_local: row.get(5)?,
            overwrite_remote: row.get(6)?,
            resolved_at: row.get(7)?,
        })
    }
}

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub dataset_id: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
    pub success: bool,
}

const RESOLUTION_COLUMNS: &str = "id, dataset_id, dataset_type, directive, merged_payload, \
     overwrite_local, overwrite_remote, resolved_at";

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- resolutions --------------------------------------------------------

    /// Journal a resolution together with its audit entry, atomically.
    /// Returns the new resolution row ID.
    pub fn record_resolution(&self, record: &ResolutionRecord) -> Result<String, DatabaseError> {
        let merged = record
            .merged_payload
            .as_ref()
            .map(|v| v.to_string());
        let id = Uuid::new_v4().to_string();

        self.transaction(|conn| {
            conn.execute(
                "INSERT INTO resolutions (id, dataset_id, dataset_type, directive, merged_payload,
                                          overwrite_local, overwrite_remote, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    record.dataset_id,
                    record.dataset_type,
                    record.directive.to_string(),
                    merged,
                    record.overwrite_local,
                    record.overwrite_remote,
                    record.resolved_at.to_rfc3339(),
                ],
            )?;

            let target = if record.overwrite_local { "local" } else { "remote" };
            let details = format!(
                "Resolved '{}' ({}) with '{}', overwriting {}",
                record.dataset_id, record.dataset_type, record.directive, target
            );
            insert_audit(conn, "resolution_recorded", Some(&record.dataset_id), Some(&details), true)?;
            Ok(())
        })?;

        debug!(id = %id, dataset_id = %record.dataset_id, "journaled resolution");
        Ok(id)
    }

    /// Return the most recent N resolutions, newest first.
    pub fn list_resolutions(&self, limit: u32) -> Result<Vec<ResolutionEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM resolutions ORDER BY resolved_at DESC, rowid DESC LIMIT ?1",
            RESOLUTION_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit], ResolutionEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// The latest journaled resolution for a dataset.
    pub fn latest_resolution(
        &self,
        dataset_id: &str,
    ) -> Result<Option<ResolutionEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM resolutions WHERE dataset_id = ?1
             ORDER BY resolved_at DESC, rowid DESC LIMIT 1",
            RESOLUTION_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![dataset_id], ResolutionEntry::from_row)?;
        match rows.next() {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Count journaled resolutions.
    pub fn count_resolutions(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM resolutions", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- audit_log ----------------------------------------------------------

    /// Insert an audit-log entry.
    pub fn insert_audit_log(
        &self,
        action: &str,
        dataset_id: Option<&str>,
        details: Option<&str>,
        success: bool,
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let id = insert_audit(&conn, action, dataset_id, details, success)?;
        debug!(id, action, "inserted audit_log entry");
        Ok(id)
    }

    /// List recent audit-log entries, newest first.
    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, dataset_id, details, created_at, success
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    dataset_id: row.get(2)?,
                    details: row.get(3)?,
                    created_at: row.get(4)?,
                    success: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn insert_audit(
    conn: &Connection,
    action: &str,
    dataset_id: Option<&str>,
    details: Option<&str>,
    success: bool,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (action, dataset_id, details, created_at, success)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![action, dataset_id, details, Utc::now().to_rfc3339(), success],
    )?;
    Ok(conn.last_insert_rowid())
}

impl ResolutionSink for Database {
    fn apply(&mut self, record: &ResolutionRecord) -> Result<(), SinkError> {
        self.record_resolution(record)?;
        Ok(())
    }
}
