use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentscope_core::error::{AgentscopeError, Result};
use agentscope_core::query::StatusResponse;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use duckdb::Connection;
use duckdb::types::Type;

use crate::schema::SCHEMA_SQL;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| AgentscopeError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AgentscopeError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| AgentscopeError::Store(format!("failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| AgentscopeError::Store(format!("failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AgentscopeError::Store(format!("failed to open in-memory db: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| AgentscopeError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: ":memory:".to_string(),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let conn = self.conn();

        Ok(StatusResponse {
            db_path: self.db_path.clone(),
            projects_count: scalar_usize(&conn, "SELECT COUNT(*) FROM projects")?,
            traces_count: scalar_usize(&conn, "SELECT COUNT(*) FROM traces")?,
            spans_count: scalar_usize(&conn, "SELECT COUNT(*) FROM spans")?,
            oldest_trace: scalar_ts(&conn, "SELECT MIN(created_at) FROM traces")?,
            newest_trace: scalar_ts(&conn, "SELECT MAX(created_at) FROM traces")?,
        })
    }
}

fn scalar_usize(conn: &Connection, sql: &str) -> Result<usize> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|v| v as usize)
        .map_err(|e| AgentscopeError::Store(format!("query failed: {e}")))
}

fn scalar_ts(conn: &Connection, sql: &str) -> Result<Option<DateTime<Utc>>> {
    conn.query_row(sql, [], |row| row.get::<_, Option<NaiveDateTime>>(0))
        .map(|opt| opt.map(naive_to_utc))
        .map_err(|e| AgentscopeError::Store(format!("query failed: {e}")))
}

pub(crate) fn naive_to_utc(ts: NaiveDateTime) -> DateTime<Utc> {
    ts.and_utc()
}

/// Timestamps are bound as text; DuckDB keeps microseconds.
pub(crate) fn ts_param(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_column<T>(idx: usize, raw: &str) -> duckdb::Result<T>
where
    T: FromStr<Err = AgentscopeError>,
{
    raw.parse::<T>()
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_column(idx: usize, raw: Option<String>) -> duckdb::Result<Option<serde_json::Value>> {
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_initializes() {
        let store = Store::open_in_memory().unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.db_path, ":memory:");
        assert_eq!(status.projects_count, 0);
        assert_eq!(status.traces_count, 0);
        assert_eq!(status.spans_count, 0);
        assert_eq!(status.oldest_trace, None);
    }

    #[test]
    fn file_store_creates_parent_dir_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/agentscope.duckdb");
        {
            let store = Store::open(&path).unwrap();
            store
                .insert_trace(&testkit::sample_trace("reopen"))
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.traces_count, 1);
        assert_eq!(status.spans_count, 4);
        assert!(status.newest_trace.is_some());
    }
}
