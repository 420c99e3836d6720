//! RunStore - one SQLite file per run

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::StoreError;

/// Schema applied to every run file
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS checkpoints (
    run_id TEXT NOT NULL,
    cycle INTEGER NOT NULL,
    inf_count INTEGER NOT NULL,
    snapshot_blob TEXT NOT NULL,
    ts TEXT NOT NULL,
    PRIMARY KEY (run_id, cycle)
);
CREATE TABLE IF NOT EXISTS executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    cycle INTEGER NOT NULL,
    flow_index TEXT NOT NULL,
    sequence TEXT NOT NULL,
    status TEXT NOT NULL,
    concept_written TEXT,
    err TEXT,
    ts TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS logs (
    exec_id INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS iteration_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    flow_index TEXT NOT NULL,
    cid TEXT NOT NULL,
    iteration INTEGER NOT NULL,
    snapshot_blob TEXT NOT NULL,
    ts TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_executions_run_cycle ON executions (run_id, cycle);
CREATE INDEX IF NOT EXISTS idx_iteration_run ON iteration_history (run_id, flow_index, cid);
";

/// A persisted checkpoint row
#[derive(Debug, Clone)]
pub struct CheckpointRow {
    pub run_id: String,
    pub cycle: u64,
    pub inf_count: u64,
    pub snapshot: serde_json::Value,
    pub ts: String,
}

/// A persisted execution row (one per dispatched inference)
#[derive(Debug, Clone)]
pub struct ExecutionRow {
    pub id: i64,
    pub run_id: String,
    pub cycle: u64,
    pub flow_index: String,
    pub sequence: String,
    pub status: String,
    pub concept_written: Option<String>,
    pub err: Option<String>,
    pub ts: String,
}

/// A persisted iteration-history row
#[derive(Debug, Clone)]
pub struct IterationRow {
    pub id: i64,
    pub run_id: String,
    pub flow_index: String,
    pub cid: String,
    pub iteration: u64,
    pub snapshot: serde_json::Value,
    pub ts: String,
}

/// Canonical on-disk location for a run's store file
pub fn store_path(runs_dir: &Path, run_id: &str) -> PathBuf {
    runs_dir.join(format!("{run_id}.sqlite"))
}

/// Durable state for a single run
#[derive(Debug)]
pub struct RunStore {
    conn: Connection,
    run_id: String,
    path: PathBuf,
}

impl RunStore {
    /// Create a fresh store file for a new run
    pub fn create(path: &Path, run_id: &str) -> Result<Self, StoreError> {
        if path.exists() {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('run_id', ?1)",
            params![run_id],
        )?;
        info!(%run_id, path = %path.display(), "Created run store");
        Ok(Self {
            conn,
            run_id: run_id.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        let run_id: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'run_id'", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or_default();
        Ok(Self {
            conn,
            run_id,
            path: path.to_path_buf(),
        })
    }

    /// The run this store belongs to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// On-disk path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a meta value
    pub fn meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a meta value (status, plan id, ...)
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Persist a checkpoint atomically; replaces any prior blob for the cycle
    pub fn save_checkpoint(
        &mut self,
        cycle: u64,
        inf_count: u64,
        snapshot: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO checkpoints (run_id, cycle, inf_count, snapshot_blob, ts)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (run_id, cycle) DO UPDATE SET
                 inf_count = excluded.inf_count,
                 snapshot_blob = excluded.snapshot_blob,
                 ts = excluded.ts",
            params![
                self.run_id,
                cycle as i64,
                inf_count as i64,
                serde_json::to_string(snapshot)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        debug!(run_id = %self.run_id, cycle, "Checkpoint saved");
        Ok(())
    }

    /// Fetch the checkpoint at a specific cycle
    pub fn checkpoint_at(&self, cycle: u64) -> Result<CheckpointRow, StoreError> {
        self.conn
            .query_row(
                "SELECT run_id, cycle, inf_count, snapshot_blob, ts
                 FROM checkpoints WHERE run_id = ?1 AND cycle = ?2",
                params![self.run_id, cycle as i64],
                row_to_checkpoint,
            )
            .optional()?
            .ok_or_else(|| StoreError::CheckpointMissing {
                run_id: self.run_id.clone(),
                cycle,
            })
    }

    /// Fetch the most recent checkpoint, if any
    pub fn latest_checkpoint(&self) -> Result<Option<CheckpointRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, cycle, inf_count, snapshot_blob, ts
                 FROM checkpoints WHERE run_id = ?1 ORDER BY cycle DESC LIMIT 1",
                params![self.run_id],
                row_to_checkpoint,
            )
            .optional()?;
        Ok(row)
    }

    /// List all checkpoints in cycle order
    pub fn checkpoints(&self) -> Result<Vec<CheckpointRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, cycle, inf_count, snapshot_blob, ts
             FROM checkpoints WHERE run_id = ?1 ORDER BY cycle ASC",
        )?;
        let rows = stmt
            .query_map(params![self.run_id], row_to_checkpoint)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record one dispatched inference; returns the execution id
    pub fn record_execution(
        &self,
        cycle: u64,
        flow_index: &str,
        sequence: &str,
        status: &str,
        concept_written: Option<&str>,
        err: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO executions (run_id, cycle, flow_index, sequence, status, concept_written, err, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.run_id,
                cycle as i64,
                flow_index,
                sequence,
                status,
                concept_written,
                err,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All execution rows in insertion order
    pub fn executions(&self) -> Result<Vec<ExecutionRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, cycle, flow_index, sequence, status, concept_written, err, ts
             FROM executions WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![self.run_id], row_to_execution)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Append a structured log body to an execution
    pub fn append_log(&self, exec_id: i64, body: &serde_json::Value) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO logs (exec_id, body) VALUES (?1, ?2)",
            params![exec_id, serde_json::to_string(body)?],
        )?;
        Ok(())
    }

    /// Log bodies recorded against an execution
    pub fn logs_for(&self, exec_id: i64) -> Result<Vec<serde_json::Value>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT body FROM logs WHERE exec_id = ?1 ORDER BY rowid ASC")?;
        let rows = stmt
            .query_map(params![exec_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(rows.len());
        for body in rows {
            out.push(serde_json::from_str(&body)?);
        }
        Ok(out)
    }

    /// Record one loop-iteration snapshot for a concept
    pub fn record_iteration(
        &self,
        flow_index: &str,
        cid: &str,
        iteration: u64,
        snapshot: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO iteration_history (run_id, flow_index, cid, iteration, snapshot_blob, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.run_id,
                flow_index,
                cid,
                iteration as i64,
                serde_json::to_string(snapshot)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Iteration rows for one (flow prefix, concept), in iteration order
    pub fn iteration_rows(&self, flow_index: &str, cid: &str) -> Result<Vec<IterationRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, flow_index, cid, iteration, snapshot_blob, ts
             FROM iteration_history
             WHERE run_id = ?1 AND flow_index = ?2 AND cid = ?3
             ORDER BY iteration ASC",
        )?;
        let rows = stmt
            .query_map(params![self.run_id, flow_index, cid], row_to_iteration)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All iteration rows for the run, in insertion order
    pub fn all_iteration_rows(&self) -> Result<Vec<IterationRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, flow_index, cid, iteration, snapshot_blob, ts
             FROM iteration_history WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![self.run_id], row_to_iteration)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fork this run at a cycle into a new store file under a new run id.
    ///
    /// Copies the checkpoint at `cycle` and every execution/log/iteration row
    /// recorded up to it. The source file is never written.
    pub fn fork_into(&self, dest: &Path, cycle: u64, new_run_id: &str) -> Result<RunStore, StoreError> {
        let checkpoint = self.checkpoint_at(cycle)?;
        let mut dest_store = RunStore::create(dest, new_run_id)?;

        dest_store.save_checkpoint(checkpoint.cycle, checkpoint.inf_count, &checkpoint.snapshot)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, cycle, flow_index, sequence, status, concept_written, err, ts
             FROM executions WHERE run_id = ?1 AND cycle <= ?2 ORDER BY id ASC",
        )?;
        let execs = stmt
            .query_map(params![self.run_id, cycle as i64], row_to_execution)?
            .collect::<Result<Vec<_>, _>>()?;
        for exec in execs {
            let new_id = dest_store.record_execution(
                exec.cycle,
                &exec.flow_index,
                &exec.sequence,
                &exec.status,
                exec.concept_written.as_deref(),
                exec.err.as_deref(),
            )?;
            for body in self.logs_for(exec.id)? {
                dest_store.append_log(new_id, &body)?;
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, flow_index, cid, iteration, snapshot_blob, ts
             FROM iteration_history WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let iters = stmt
            .query_map(params![self.run_id], row_to_iteration)?
            .collect::<Result<Vec<_>, _>>()?;
        for iter in iters {
            dest_store.record_iteration(&iter.flow_index, &iter.cid, iter.iteration, &iter.snapshot)?;
        }

        info!(
            source = %self.run_id, dest = %new_run_id, cycle,
            "Forked run store"
        );
        Ok(dest_store)
    }
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointRow> {
    let blob: String = row.get(3)?;
    Ok(CheckpointRow {
        run_id: row.get(0)?,
        cycle: row.get::<_, i64>(1)? as u64,
        inf_count: row.get::<_, i64>(2)? as u64,
        snapshot: serde_json::from_str(&blob).unwrap_or(serde_json::Value::Null),
        ts: row.get(4)?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        cycle: row.get::<_, i64>(2)? as u64,
        flow_index: row.get(3)?,
        sequence: row.get(4)?,
        status: row.get(5)?,
        concept_written: row.get(6)?,
        err: row.get(7)?,
        ts: row.get(8)?,
    })
}

fn row_to_iteration(row: &rusqlite::Row<'_>) -> rusqlite::Result<IterationRow> {
    let blob: String = row.get(5)?;
    Ok(IterationRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        flow_index: row.get(2)?,
        cid: row.get(3)?,
        iteration: row.get::<_, i64>(4)? as u64,
        snapshot: serde_json::from_str(&blob).unwrap_or(serde_json::Value::Null),
        ts: row.get(6)?,
    })
}
