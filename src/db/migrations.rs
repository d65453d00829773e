// Database migrations
use anyhow::Result;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    // Episodes the listener has finished, keyed by enclosure URL
    conn.execute(
        "CREATE TABLE IF NOT EXISTS played_episodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT UNIQUE NOT NULL,
            played_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_played_episodes_played_at ON played_episodes(played_at)",
        [],
    )?;

    conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;

    Ok(())
}
