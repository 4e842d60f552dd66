use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::{StandardizedCitation, StatusStore, StoreError};
use crate::status::StatusCode;

/// SQLite-backed store: one row per citation id, replaced on every upsert.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

fn open_sqlite(path: &Path) -> Result<Connection, rusqlite::Error> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_sqlite(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS standardized (
                 id          TEXT PRIMARY KEY,
                 status      INTEGER NOT NULL,
                 record      TEXT NOT NULL,
                 update_date TEXT NOT NULL
             );",
        )?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full stored record for a citation id.
    pub fn get_record(&self, citation_id: &str) -> Result<Option<StandardizedCitation>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let json: Option<String> = conn
            .prepare_cached("SELECT record FROM standardized WHERE id = ?1")?
            .query_row(params![citation_id], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl StatusStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn get_status(&self, citation_id: &str) -> Result<Option<StatusCode>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let code: Option<i64> = conn
            .prepare_cached("SELECT status FROM standardized WHERE id = ?1")?
            .query_row(params![citation_id], |row| row.get(0))
            .optional()?;

        match code {
            None => Ok(None),
            Some(code) => u8::try_from(code)
                .ok()
                .and_then(StatusCode::from_code)
                .map(Some)
                .ok_or_else(|| StoreError::InvalidStatus {
                    citation_id: citation_id.to_string(),
                    code,
                }),
        }
    }

    fn upsert_batch(&self, records: &[StandardizedCitation]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO standardized (id, status, record, update_date)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     record = excluded.record,
                     update_date = excluded.update_date",
            )?;
            for record in records {
                let json = serde_json::to_string(record)?;
                stmt.execute(params![
                    record.citation_id,
                    record.status.code(),
                    json,
                    record.update_date
                ])?;
            }
        }
        tx.commit()?;

        tracing::trace!(records = records.len(), "upserted batch");
        Ok(records.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM standardized", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: StatusCode) -> StandardizedCitation {
        let mut rec = StandardizedCitation::not_normalized(id, "A TITLE", "2024-01-01");
        rec.status = status;
        rec
    }

    #[test]
    fn upsert_replaces_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("std.db")).unwrap();

        store
            .upsert_batch(&[record("a", StatusCode::NotNormalized), record("b", StatusCode::Exact)])
            .unwrap();
        store.upsert_batch(&[record("a", StatusCode::FuzzyValidatedLr)]).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get_status("a").unwrap(), Some(StatusCode::FuzzyValidatedLr));
        assert_eq!(store.get_status("missing").unwrap(), None);
        assert_eq!(
            store.get_record("a").unwrap().unwrap().status,
            StatusCode::FuzzyValidatedLr
        );
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("std.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_batch(&[record("a", StatusCode::ExactValidated)]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_status("a").unwrap(), Some(StatusCode::ExactValidated));
    }

    #[test]
    fn unknown_stored_status_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("std.db")).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO standardized (id, status, record, update_date) VALUES ('x', 42, '{}', '')",
                [],
            )
            .unwrap();
        }
        assert!(matches!(
            store.get_status("x"),
            Err(StoreError::InvalidStatus { code: 42, .. })
        ));
    }
}
