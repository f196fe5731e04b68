use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// An image uploaded directly to a maze. Either `blob_ref` points at the
/// blob service, or `inline` carries the bytes in the row itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MazeImage {
    pub id: i64,
    pub maze_id: String,
    pub blob_ref: Option<String>,
    pub inline: Option<Vec<u8>>,
    pub message: String,
}

impl MazeImage {
    /// The reference to embed in a locator: blob key when one exists,
    /// otherwise the row ID for inline serving.
    pub fn reference(&self) -> String {
        match &self.blob_ref {
            Some(blob_ref) => blob_ref.clone(),
            None => self.id.to_string(),
        }
    }
}

/// SQLite-backed store for uploaded maze images.
pub struct MazeImageStore {
    conn: Mutex<Connection>,
}

impl MazeImageStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open image database")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS maze_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                maze_id TEXT NOT NULL,
                blob_ref TEXT,
                inline BLOB,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create maze_images table")?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_maze_images_maze
             ON maze_images (maze_id, id)",
            [],
        )
        .context("Failed to create maze_images index")?;
        Ok(())
    }

    pub fn insert(
        &self,
        maze_id: &str,
        blob_ref: Option<&str>,
        inline: Option<&[u8]>,
        message: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO maze_images (maze_id, blob_ref, inline, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![maze_id, blob_ref, inline, message, Utc::now().to_rfc3339()],
        )
        .context("Failed to insert maze image")?;
        Ok(conn.last_insert_rowid())
    }

    /// Page through a maze's images in upload order. Pages are 1-based.
    pub fn list_page(&self, maze_id: &str, page: u32, page_size: u32) -> Result<Vec<MazeImage>> {
        let page = page.max(1);
        let offset = u64::from(page - 1) * u64::from(page_size);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, maze_id, blob_ref, inline, message
                 FROM maze_images WHERE maze_id = ?1
                 ORDER BY id LIMIT ?2 OFFSET ?3",
            )
            .context("Failed to prepare image query")?;
        let rows = stmt
            .query_map(params![maze_id, page_size, offset], |row| {
                Ok(MazeImage {
                    id: row.get(0)?,
                    maze_id: row.get(1)?,
                    blob_ref: row.get(2)?,
                    inline: row.get(3)?,
                    message: row.get(4)?,
                })
            })
            .context("Failed to query maze images")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read maze image rows")
    }

    /// Resolve a locator reference back to its row: blob key when the image
    /// is blob-backed, otherwise the row ID of an inline image. Scoped to a
    /// maze so one maze's keys cannot address another's images.
    pub fn get_by_reference(&self, maze_id: &str, reference: &str) -> Result<Option<MazeImage>> {
        use rusqlite::OptionalExtension;
        let row_id: i64 = reference.parse().unwrap_or(-1);
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, maze_id, blob_ref, inline, message
             FROM maze_images
             WHERE maze_id = ?1
               AND (blob_ref = ?2 OR (blob_ref IS NULL AND id = ?3))",
            params![maze_id, reference, row_id],
            |row| {
                Ok(MazeImage {
                    id: row.get(0)?,
                    maze_id: row.get(1)?,
                    blob_ref: row.get(2)?,
                    inline: row.get(3)?,
                    message: row.get(4)?,
                })
            },
        )
        .optional()
        .context("Failed to resolve image reference")
    }

    pub fn get(&self, id: i64) -> Result<Option<MazeImage>> {
        use rusqlite::OptionalExtension;
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, maze_id, blob_ref, inline, message
             FROM maze_images WHERE id = ?1",
            params![id],
            |row| {
                Ok(MazeImage {
                    id: row.get(0)?,
                    maze_id: row.get(1)?,
                    blob_ref: row.get(2)?,
                    inline: row.get(3)?,
                    message: row.get(4)?,
                })
            },
        )
        .optional()
        .context("Failed to query maze image")
    }
}
