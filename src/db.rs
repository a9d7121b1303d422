use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "planner.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            term TEXT NOT NULL,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_term ON schedules(term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_blocks(
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            course_code TEXT NOT NULL,
            section TEXT,
            room TEXT,
            course_title TEXT,
            day_of_week INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            color TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(schedule_id) REFERENCES schedules(id)
        )",
        [],
    )?;
    // Early workspaces predate per-block rooms. Add the column if missing.
    ensure_blocks_room(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_blocks_schedule ON schedule_blocks(schedule_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_blocks_schedule_day ON schedule_blocks(schedule_id, day_of_week)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            term TEXT NOT NULL,
            course_code TEXT NOT NULL,
            course_title TEXT,
            units REAL NOT NULL,
            letter TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(term, course_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_term ON grades(term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculum_courses(
            id TEXT PRIMARY KEY,
            program_code TEXT NOT NULL,
            course_code TEXT NOT NULL,
            title TEXT NOT NULL,
            units REAL NOT NULL,
            category TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(program_code, course_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_curriculum_program ON curriculum_courses(program_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_blocks_room(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "schedule_blocks", "room")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE schedule_blocks ADD COLUMN room TEXT", [])?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        None => Ok(None),
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
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
