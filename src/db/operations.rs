use rusqlite::{params, OptionalExtension};
use crate::db::connection::DatabaseConnection;
use crate::db::models::PlayedEpisode;

/// Database operations for played-episode bookkeeping
pub struct DbOperations;

impl DbOperations {
    /// Mark an episode as played, refreshing the timestamp if it already was
    pub fn mark_played(db: &DatabaseConnection, url: &str) -> Result<(), anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO played_episodes (url, played_at) VALUES (?1, ?2)
             ON CONFLICT(url) DO UPDATE SET played_at = excluded.played_at",
            params![url, now],
        )?;

        Ok(())
    }

    pub fn unmark_played(db: &DatabaseConnection, url: &str) -> Result<bool, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let removed = conn.execute("DELETE FROM played_episodes WHERE url = ?1", params![url])?;
        Ok(removed > 0)
    }

    pub fn is_played(db: &DatabaseConnection, url: &str) -> Result<bool, anyhow::Error> {
        Ok(Self::get_played(db, url)?.is_some())
    }

    pub fn get_played(
        db: &DatabaseConnection,
        url: &str,
    ) -> Result<Option<PlayedEpisode>, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let played = conn
            .query_row(
                "SELECT id, url, played_at FROM played_episodes WHERE url = ?1",
                params![url],
                |row| {
                    Ok(PlayedEpisode {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        played_at: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(played)
    }

    /// All played URLs, most recent first
    pub fn played_urls(db: &DatabaseConnection) -> Result<Vec<String>, anyhow::Error> {
        let conn = db.get_connection();
        let conn = conn.lock();

        let mut stmt = conn.prepare("SELECT url FROM played_episodes ORDER BY played_at DESC, id DESC")?;
        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(urls)
    }
}
