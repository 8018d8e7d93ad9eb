use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::error::BatchSetupError;
use crate::model::{ChildRecord, RunSummary, TopLevelRecord};
use crate::output::RecordWriter;

pub fn connect(path: &Path) -> Result<Connection, BatchSetupError> {
    let store_err = |e: &dyn std::fmt::Display| BatchSetupError::Store {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| store_err(&e))?;
    }
    let conn = Connection::open(path).map_err(|e| store_err(&e))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| store_err(&e))?;
    init_schema(&conn).map_err(|e| store_err(&e))?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS comments (
            id                INTEGER PRIMARY KEY,
            run_date          TEXT NOT NULL,
            video_id          TEXT NOT NULL,
            comment_id        TEXT NOT NULL,
            author            TEXT NOT NULL,
            author_channel_id TEXT NOT NULL,
            text              TEXT NOT NULL,
            like_count        INTEGER NOT NULL DEFAULT 0,
            published_at      TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            reply_count       INTEGER NOT NULL DEFAULT 0,
            UNIQUE(run_date, video_id, comment_id)
        );
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(run_date, video_id);

        CREATE TABLE IF NOT EXISTS replies (
            id                INTEGER PRIMARY KEY,
            run_date          TEXT NOT NULL,
            video_id          TEXT NOT NULL,
            parent_comment_id TEXT NOT NULL,
            reply_id          TEXT NOT NULL,
            author            TEXT NOT NULL,
            author_channel_id TEXT NOT NULL,
            text              TEXT NOT NULL,
            like_count        INTEGER NOT NULL DEFAULT 0,
            published_at      TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            UNIQUE(run_date, video_id, reply_id)
        );
        CREATE INDEX IF NOT EXISTS idx_replies_video ON replies(run_date, video_id);
        CREATE INDEX IF NOT EXISTS idx_replies_parent ON replies(parent_comment_id);

        CREATE TABLE IF NOT EXISTS runs (
            id             INTEGER PRIMARY KEY,
            run_date       TEXT NOT NULL,
            started_at     TEXT NOT NULL DEFAULT (datetime('now')),
            identifiers    INTEGER NOT NULL,
            written        INTEGER NOT NULL,
            total_comments INTEGER NOT NULL,
            total_replies  INTEGER NOT NULL,
            failed         INTEGER NOT NULL,
            elapsed_ms     INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_date ON runs(run_date);

        CREATE TABLE IF NOT EXISTS run_failures (
            id       INTEGER PRIMARY KEY,
            run_id   INTEGER NOT NULL REFERENCES runs(id),
            video_id TEXT NOT NULL,
            error    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_run_failures_run ON run_failures(run_id);
        ",
    )
}

// ── Records ──

/// Stores one run's comments and replies keyed by `(run_date, video_id)`.
pub struct SqliteStore {
    conn: Connection,
    run_date: String,
}

impl SqliteStore {
    pub fn new(conn: Connection, run_date: &str) -> Self {
        SqliteStore {
            conn,
            run_date: run_date.to_string(),
        }
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordWriter for SqliteStore {
    fn write_records(
        &mut self,
        identifier: &str,
        top_level: &[TopLevelRecord],
        children: &[ChildRecord],
    ) -> Result<()> {
        save_records(&self.conn, &self.run_date, identifier, top_level, children)
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        record_run(&self.conn, summary)?;
        Ok(())
    }
}

/// Replace everything stored for `identifier` on `run_date` in one transaction.
pub fn save_records(
    conn: &Connection,
    run_date: &str,
    identifier: &str,
    top_level: &[TopLevelRecord],
    children: &[ChildRecord],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM comments WHERE run_date = ?1 AND video_id = ?2",
        rusqlite::params![run_date, identifier],
    )?;
    tx.execute(
        "DELETE FROM replies WHERE run_date = ?1 AND video_id = ?2",
        rusqlite::params![run_date, identifier],
    )?;
    {
        let mut c_stmt = tx.prepare(
            "INSERT INTO comments
             (run_date, video_id, comment_id, author, author_channel_id, text,
              like_count, published_at, updated_at, reply_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for c in top_level {
            c_stmt.execute(rusqlite::params![
                run_date, c.identifier, c.record_id, c.author, c.author_id, c.text,
                c.like_count as i64, c.published_at, c.updated_at, c.child_count as i64,
            ])?;
        }

        let mut r_stmt = tx.prepare(
            "INSERT INTO replies
             (run_date, video_id, parent_comment_id, reply_id, author, author_channel_id,
              text, like_count, published_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for r in children {
            r_stmt.execute(rusqlite::params![
                run_date, r.identifier, r.parent_record_id, r.child_id, r.author, r.author_id,
                r.text, r.like_count as i64, r.published_at, r.updated_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Runs ──

pub fn record_run(conn: &Connection, summary: &RunSummary) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO runs
         (run_date, identifiers, written, total_comments, total_replies, failed, elapsed_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            summary.run_date,
            summary.identifiers as i64,
            summary.written as i64,
            summary.total_top_level as i64,
            summary.total_child as i64,
            summary.failed.len() as i64,
            summary.elapsed.as_millis() as i64,
        ],
    )?;
    let run_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO run_failures (run_id, video_id, error) VALUES (?1, ?2, ?3)",
        )?;
        for f in &summary.failed {
            stmt.execute(rusqlite::params![run_id, f.identifier, f.error])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

pub struct RunRow {
    pub id: i64,
    pub run_date: String,
    pub started_at: String,
    pub identifiers: usize,
    pub written: usize,
    pub total_comments: usize,
    pub total_replies: usize,
    pub failed: usize,
    pub elapsed_ms: i64,
}

/// Most recent runs first, optionally limited to one run date.
pub fn fetch_runs(conn: &Connection, run_date: Option<&str>, limit: usize) -> Result<Vec<RunRow>> {
    let sql = format!(
        "SELECT id, run_date, started_at, identifiers, written, total_comments,
                total_replies, failed, elapsed_ms
         FROM runs{}
         ORDER BY id DESC
         LIMIT {}",
        if run_date.is_some() { " WHERE run_date = ?1" } else { "" },
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = match run_date {
        Some(date) => stmt.query_map([date], run_row)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], run_row)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        run_date: row.get(1)?,
        started_at: row.get(2)?,
        identifiers: row.get(3)?,
        written: row.get(4)?,
        total_comments: row.get(5)?,
        total_replies: row.get(6)?,
        failed: row.get(7)?,
        elapsed_ms: row.get(8)?,
    })
}

pub fn fetch_failures(conn: &Connection, run_id: i64) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT video_id, error FROM run_failures WHERE run_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub fn count_records(conn: &Connection, run_date: &str, identifier: &str) -> Result<(usize, usize)> {
    let comments: usize = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE run_date = ?1 AND video_id = ?2",
        [run_date, identifier],
        |r| r.get(0),
    )?;
    let replies: usize = conn.query_row(
        "SELECT COUNT(*) FROM replies WHERE run_date = ?1 AND video_id = ?2",
        [run_date, identifier],
        |r| r.get(0),
    )?;
    Ok((comments, replies))
}
