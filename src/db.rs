use anyhow::Context;
use log::warn;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            roll TEXT NOT NULL,
            department TEXT NOT NULL,
            semester INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_roll ON students(roll COLLATE NOCASE)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_department ON students(department)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            cgpa_hundredths INTEGER NOT NULL,
            status TEXT NOT NULL,
            revision INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            weighted INTEGER NOT NULL DEFAULT 0,
            submitted_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, semester)
        )",
        [],
    )?;
    ensure_results_weighted(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_semester ON results(semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_subjects(
            result_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            subject_name TEXT NOT NULL,
            marks INTEGER NOT NULL,
            grade TEXT NOT NULL,
            point_hundredths INTEGER NOT NULL,
            credit REAL,
            PRIMARY KEY(result_id, idx),
            FOREIGN KEY(result_id) REFERENCES results(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_results_weighted(conn: &Connection) -> anyhow::Result<()> {
    // Results stored before credit weighting existed were all plain means.
    if table_has_column(conn, "results", "weighted")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE results ADD COLUMN weighted INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
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

/// Unreadable stored JSON is treated as unset so callers fall back to defaults.
pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(s) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(&s) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!("ignoring malformed setting {}: {}", key, e);
            Ok(None)
        }
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
