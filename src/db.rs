use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("portal.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Several portald processes may share one workspace. Queue writers
    // instead of failing immediately on a held write lock.
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookings(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            day_of_week TEXT NOT NULL,
            start_min INTEGER NOT NULL,
            end_min INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Lookup path for the overlap scan.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_classroom_day
         ON bookings(classroom_id, day_of_week)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_group ON bookings(group_id)",
        [],
    )?;

    Ok(conn)
}
