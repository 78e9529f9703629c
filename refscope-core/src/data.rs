use crate::summary::DomainSummary;
use refscope_scanner::PageRecord;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: String,
    pub data_root: String,
    pub configuration: Option<String>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn run_from_row(row: &Row<'_>) -> Result<RunInfo> {
    Ok(RunInfo {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        status: row.get(3)?,
        data_root: row.get(4)?,
        configuration: row.get(5)?,
    })
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
-- One row per `analyze` invocation
CREATE TABLE IF NOT EXISTS analysis_runs (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    data_root TEXT NOT NULL,
    configuration TEXT        -- JSON options used
);

-- Corpus rows: one per crawled site
CREATE TABLE IF NOT EXISTS domain_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    domain TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT -1,
    cmp TEXT,
    pages INTEGER NOT NULL DEFAULT 0,
    leaked_endpoints TEXT NOT NULL,   -- JSON array
    third_parties TEXT NOT NULL,      -- JSON array
    referrer_leakage TEXT NOT NULL,   -- JSON array
    declared_policies TEXT NOT NULL,  -- JSON array, first-seen order
    policy_usage TEXT NOT NULL,       -- JSON object
    analyzed_at INTEGER NOT NULL,

    FOREIGN KEY(run_id) REFERENCES analysis_runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, domain)
);

CREATE INDEX IF NOT EXISTS idx_domain_results_run ON domain_results(run_id);
CREATE INDEX IF NOT EXISTS idx_domain_results_rank ON domain_results(run_id, rank);

-- Compacted per-page records
CREATE TABLE IF NOT EXISTS page_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    domain TEXT NOT NULL,
    crawled_url TEXT NOT NULL,
    record TEXT NOT NULL,             -- JSON object
    has_leakage BOOLEAN NOT NULL DEFAULT 0,

    FOREIGN KEY(run_id) REFERENCES analysis_runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_page_results_run ON page_results(run_id, domain);
            ",
        )?;
        Ok(())
    }

    // Run management
    pub fn create_run(&self, data_root: &str, configuration: Option<&str>) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let timestamp = current_timestamp();

        self.conn.execute(
            "INSERT INTO analysis_runs (id, start_time, status, data_root, configuration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&run_id, timestamp, RunStatus::Running.as_str(), data_root, configuration],
        )?;

        Ok(run_id)
    }

    pub fn complete_run(&self, run_id: &str) -> Result<()> {
        self.finish_run(run_id, RunStatus::Completed)
    }

    pub fn fail_run(&self, run_id: &str) -> Result<()> {
        self.finish_run(run_id, RunStatus::Failed)
    }

    fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let timestamp = current_timestamp();
        self.conn.execute(
            "UPDATE analysis_runs SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status.as_str(), timestamp, run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, data_root, configuration
             FROM analysis_runs WHERE id = ?1",
        )?;
        stmt.query_row(params![run_id], run_from_row).optional()
    }

    /// Most recent completed run.
    pub fn latest_run(&self) -> Result<Option<RunInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, data_root, configuration
             FROM analysis_runs WHERE status = 'completed'
             ORDER BY start_time DESC, rowid DESC LIMIT 1",
        )?;
        stmt.query_row([], run_from_row).optional()
    }

    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, data_root, configuration
             FROM analysis_runs ORDER BY start_time, rowid",
        )?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(runs)
    }

    // Corpus rows
    pub fn insert_domain_summary(&self, run_id: &str, summary: &DomainSummary) -> Result<i64> {
        let timestamp = current_timestamp();

        self.conn.execute(
            "INSERT INTO domain_results (
                run_id, domain, rank, cmp, pages, leaked_endpoints, third_parties,
                referrer_leakage, declared_policies, policy_usage, analyzed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run_id,
                &summary.domain,
                summary.rank_value(),
                &summary.cmp,
                summary.pages as i64,
                to_json(&summary.leaked_endpoints)?,
                to_json(&summary.third_parties)?,
                to_json(&summary.referrer_leakage)?,
                to_json(&summary.declared_policies)?,
                to_json(&summary.policy)?,
                timestamp,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_domain_summaries(&self, run_id: &str) -> Result<Vec<DomainSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, rank, cmp, pages, leaked_endpoints, third_parties,
                    referrer_leakage, declared_policies, policy_usage
             FROM domain_results WHERE run_id = ?1 ORDER BY domain",
        )?;

        let summaries = stmt
            .query_map(params![run_id], |row| {
                let rank: i64 = row.get(1)?;
                let pages: i64 = row.get(3)?;
                Ok(DomainSummary {
                    domain: row.get(0)?,
                    rank: usize::try_from(rank).ok(),
                    cmp: row.get(2)?,
                    pages: pages.max(0) as usize,
                    leaked_endpoints: from_json::<BTreeSet<String>>(row, 4)?,
                    third_parties: from_json::<BTreeSet<String>>(row, 5)?,
                    referrer_leakage: from_json::<BTreeSet<String>>(row, 6)?,
                    declared_policies: from_json(row, 7)?,
                    policy: from_json(row, 8)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(summaries)
    }

    // Page records
    pub fn insert_page_record(&self, run_id: &str, domain: &str, record: &PageRecord) -> Result<i64> {
        let has_leakage = !record.request_leakage.is_empty() || !record.referrer_leakage.is_empty();

        self.conn.execute(
            "INSERT INTO page_results (run_id, domain, crawled_url, record, has_leakage)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, domain, &record.crawled_url, to_json(record)?, has_leakage],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_page_records(&self, run_id: &str, domain: &str) -> Result<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record FROM page_results WHERE run_id = ?1 AND domain = ?2 ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![run_id, domain], |row| from_json(row, 0))?
            .collect::<Result<Vec<_>>>()?;

        Ok(records)
    }

    pub fn count_leaking_pages(&self, run_id: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM page_results WHERE run_id = ?1 AND has_leakage = 1",
            params![run_id],
            |row| row.get(0),
        )
    }

    /// Remove every run and its results. Returns the number of runs removed.
    pub fn clear_results(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM page_results", [])?;
        self.conn.execute("DELETE FROM domain_results", [])?;
        self.conn.execute("DELETE FROM analysis_runs", [])
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
