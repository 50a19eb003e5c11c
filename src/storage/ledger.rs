//! SQLite ledger of trained models and served requests

use rusqlite::{params, Connection, Result as SqliteResult};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::ModelArtifact;
use crate::training::ActivationStatus;

/// One served request, as recorded off the request path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub trace_id: String,
    /// Request parameters as JSON
    pub params_json: String,
    pub latency_ms: f64,
    /// `ok` or the error kind
    pub outcome: String,
    pub ts: String,
}

/// A model row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub name: String,
    pub version: String,
    pub metrics_json: String,
    pub status: String,
    pub created_at: String,
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    /// Open (or create) the ledger file and initialize tables
    pub fn open(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        ledger.init_tables()?;
        Ok(ledger)
    }

    /// Create in-memory ledger (for testing)
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        ledger.init_tables()?;
        Ok(ledger)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_tables(&self) -> SqliteResult<()> {
        let conn = self.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                metrics_json TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (name, version)
            );

            CREATE TABLE IF NOT EXISTS requests (
                trace_id TEXT PRIMARY KEY,
                params_json TEXT NOT NULL,
                latency_ms REAL NOT NULL,
                outcome TEXT NOT NULL,
                ts TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_requests_ts ON requests(ts);
            "#,
        )?;

        Ok(())
    }

    // ==================== Model Operations ====================

    /// Record a trained artifact and what became of it
    pub fn record_model(&self, artifact: &ModelArtifact, status: ActivationStatus) -> SqliteResult<()> {
        let metrics_json = serde_json::to_string(artifact.metrics())
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO models (name, version, metrics_json, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                artifact.name(),
                artifact.version(),
                metrics_json,
                status.as_str(),
                artifact.created_at().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Update the status of a recorded model (activation, rollback)
    pub fn set_model_status(&self, name: &str, version: &str, status: &str) -> SqliteResult<usize> {
        let conn = self.lock();
        conn.execute(
            "UPDATE models SET status = ?1 WHERE name = ?2 AND version = ?3",
            params![status, name, version],
        )
    }

    /// Models of one name, newest first
    pub fn models(&self, name: &str) -> SqliteResult<Vec<ModelRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, version, metrics_json, status, created_at
             FROM models WHERE name = ?1 ORDER BY created_at DESC, version DESC",
        )?;
        let rows = stmt.query_map(params![name], |row| {
            Ok(ModelRecord {
                name: row.get(0)?,
                version: row.get(1)?,
                metrics_json: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    // ==================== Request Operations ====================

    /// Record a batch of served requests in one transaction
    pub fn record_requests(&self, records: &[RequestRecord]) -> SqliteResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO requests (trace_id, params_json, latency_ms, outcome, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![r.trace_id, r.params_json, r.latency_ms, r.outcome, r.ts])?;
            }
        }
        tx.commit()
    }

    pub fn request_count(&self) -> SqliteResult<i64> {
        let conn = self.lock();
        conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))
    }

    /// Most recent requests, newest first
    pub fn recent_requests(&self, limit: usize) -> SqliteResult<Vec<RequestRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT trace_id, params_json, latency_ms, outcome, ts
             FROM requests ORDER BY ts DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RequestRecord {
                trace_id: row.get(0)?,
                params_json: row.get(1)?,
                latency_ms: row.get(2)?,
                outcome: row.get(3)?,
                ts: row.get(4)?,
            })
        })?;
        rows.collect()
    }
}
