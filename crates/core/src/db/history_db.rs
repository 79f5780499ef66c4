use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::db::models::{parse_phase, parse_status};
use crate::db::{DbError, DbResult, GradingRunRecord, MIN_SUPPORTED_SCHEMA_VERSION};
use crate::report::{BuildReport, RunStatus};

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// SQLite-backed grading history.
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (or create) a history database at `path` and bring the schema up to date.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Store a finished run. Returns the row id.
    pub fn insert_run(&self, record: &GradingRunRecord, report: &BuildReport) -> DbResult<i64> {
        let report_json = serde_json::to_string(report)?;
        self.conn.execute(
            r#"
            INSERT INTO grading_runs (run_id, exercise_id, language, solution_hash, status, last_phase, exit_code, duration_ms, started_at, finished_at, report_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.run_id,
                record.exercise_id,
                record.language,
                record.solution_hash,
                record.status.as_str(),
                record.last_phase.map(|p| p.as_str()),
                record.exit_code,
                record.duration_ms,
                record.started_at,
                record.finished_at,
                report_json,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, run = %record.run_id, "stored grading run");
        Ok(id)
    }

    /// Runs in insertion order, optionally only those for one exercise.
    pub fn list_runs(&self, exercise_id: Option<&str>) -> DbResult<Vec<GradingRunRecord>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<(GradingRunRecord, String, Option<String>)> {
            let record = GradingRunRecord {
                run_id: row.get(0)?,
                exercise_id: row.get(1)?,
                language: row.get(2)?,
                solution_hash: row.get(3)?,
                status: RunStatus::Failed,
                last_phase: None,
                exit_code: row.get(6)?,
                duration_ms: row.get(7)?,
                started_at: row.get(8)?,
                finished_at: row.get(9)?,
            };
            Ok((record, row.get(4)?, row.get(5)?))
        }

        fn decode((mut record, status, last_phase): (GradingRunRecord, String, Option<String>)) -> DbResult<GradingRunRecord> {
            let corrupt = |column: &'static str, value: &str, run_id: &str| DbError::CorruptRecord {
                run_id: run_id.to_string(),
                column,
                value: value.to_string(),
            };
            record.status = parse_status(&status).ok_or_else(|| corrupt("status", &status, &record.run_id))?;
            record.last_phase = match last_phase.as_deref() {
                None => None,
                Some(p) => Some(parse_phase(p).ok_or_else(|| corrupt("last_phase", p, &record.run_id))?),
            };
            Ok(record)
        }

        const COLUMNS: &str = "run_id, exercise_id, language, solution_hash, status, last_phase, exit_code, duration_ms, started_at, finished_at";

        let mut out = Vec::new();
        match exercise_id {
            Some(ex) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM grading_runs WHERE exercise_id = ?1 ORDER BY id"
                ))?;
                for row in stmt.query_map(params![ex], map_run)? {
                    out.push(decode(row?)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!("SELECT {COLUMNS} FROM grading_runs ORDER BY id"))?;
                for row in stmt.query_map([], map_run)? {
                    out.push(decode(row?)?);
                }
            }
        }
        Ok(out)
    }

    /// Full stored report of the most recent run with `run_id`.
    pub fn get_report(&self, run_id: &str) -> DbResult<Option<BuildReport>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT report_json FROM grading_runs WHERE run_id = ?1 ORDER BY id DESC LIMIT 1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(DbError::from)).transpose()
    }
}

fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS grading_runs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id        TEXT NOT NULL,
                exercise_id   TEXT NOT NULL,
                language      TEXT NOT NULL,
                solution_hash TEXT NOT NULL,
                status        TEXT NOT NULL,
                last_phase    TEXT,
                exit_code     INTEGER,
                duration_ms   INTEGER NOT NULL,
                started_at    TEXT NOT NULL,
                finished_at   TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            ALTER TABLE grading_runs ADD COLUMN report_json TEXT NOT NULL DEFAULT '{}';
            CREATE INDEX IF NOT EXISTS idx_grading_runs_exercise ON grading_runs (exercise_id);
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
