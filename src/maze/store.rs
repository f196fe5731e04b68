use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use super::{random_key, FacebookSettings, FlickrSettings, InstagramSettings, Maze};

/// How many fresh IDs to try before giving up on creation. Collisions on
/// 32-char alphanumeric keys are effectively impossible, so more than one
/// iteration indicates a broken RNG rather than bad luck.
const CREATE_ATTEMPTS: usize = 5;

/// SQLite-backed maze store. Service settings are serialized as JSON
/// columns so settings can grow fields without schema migrations.
pub struct MazeStore {
    conn: Mutex<Connection>,
}

impl MazeStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open maze database")?;
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
            "CREATE TABLE IF NOT EXISTS mazes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                password_hash TEXT,
                hash_method TEXT,
                salt TEXT,
                admin_key TEXT NOT NULL,
                admin_email TEXT NOT NULL,
                enable_sharing INTEGER NOT NULL DEFAULT 0,
                flickr TEXT NOT NULL,
                instagram TEXT NOT NULL,
                facebook TEXT NOT NULL,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create mazes table")?;
        Ok(())
    }

    /// Create a maze with a fresh ID and admin key. The insert uses
    /// `INSERT OR IGNORE` so an ID collision is detected atomically and
    /// retried with a new candidate.
    pub fn create(
        &self,
        name: &str,
        admin_email: &str,
        password: &str,
        pepper: &str,
    ) -> Result<Maze> {
        let now = Utc::now();
        let mut maze = Maze {
            id: String::new(),
            name: name.to_string(),
            password_hash: None,
            hash_method: None,
            salt: None,
            admin_key: random_key(),
            admin_email: admin_email.to_string(),
            enable_sharing: false,
            flickr: FlickrSettings::default(),
            instagram: InstagramSettings::default(),
            facebook: FacebookSettings::default(),
            created_at: now,
            modified_at: now,
        };
        maze.set_password(password, pepper);

        let conn = self.conn.lock().unwrap();
        for _ in 0..CREATE_ATTEMPTS {
            maze.id = random_key();
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO mazes
                     (id, name, password_hash, hash_method, salt, admin_key, admin_email,
                      enable_sharing, flickr, instagram, facebook, created_at, modified_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        maze.id,
                        maze.name,
                        maze.password_hash,
                        maze.hash_method,
                        maze.salt,
                        maze.admin_key,
                        maze.admin_email,
                        maze.enable_sharing,
                        serde_json::to_string(&maze.flickr)?,
                        serde_json::to_string(&maze.instagram)?,
                        serde_json::to_string(&maze.facebook)?,
                        maze.created_at.to_rfc3339(),
                        maze.modified_at.to_rfc3339(),
                    ],
                )
                .context("Failed to insert maze")?;
            if inserted == 1 {
                info!(maze_id = %maze.id, "Created maze");
                return Ok(maze);
            }
        }
        Err(anyhow!("Could not allocate a unique maze ID"))
    }

    pub fn get(&self, id: &str) -> Result<Option<Maze>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, password_hash, hash_method, salt, admin_key, admin_email,
                    enable_sharing, flickr, instagram, facebook, created_at, modified_at
             FROM mazes WHERE id = ?1",
            params![id],
            row_to_maze,
        )
        .optional()
        .context("Failed to query maze")
    }

    /// Persist mutations to an existing maze, bumping `modified_at`.
    pub fn put(&self, maze: &mut Maze) -> Result<()> {
        maze.modified_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE mazes SET
                    name = ?2, password_hash = ?3, hash_method = ?4, salt = ?5,
                    admin_email = ?6, enable_sharing = ?7,
                    flickr = ?8, instagram = ?9, facebook = ?10, modified_at = ?11
                 WHERE id = ?1",
                params![
                    maze.id,
                    maze.name,
                    maze.password_hash,
                    maze.hash_method,
                    maze.salt,
                    maze.admin_email,
                    maze.enable_sharing,
                    serde_json::to_string(&maze.flickr)?,
                    serde_json::to_string(&maze.instagram)?,
                    serde_json::to_string(&maze.facebook)?,
                    maze.modified_at.to_rfc3339(),
                ],
            )
            .context("Failed to update maze")?;
        if updated == 0 {
            return Err(anyhow!("Maze not found: {}", maze.id));
        }
        Ok(())
    }
}

fn row_to_maze(row: &Row) -> rusqlite::Result<Maze> {
    let flickr: String = row.get(8)?;
    let instagram: String = row.get(9)?;
    let facebook: String = row.get(10)?;
    let created: String = row.get(11)?;
    let modified: String = row.get(12)?;
    Ok(Maze {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        hash_method: row.get(3)?,
        salt: row.get(4)?,
        admin_key: row.get(5)?,
        admin_email: row.get(6)?,
        enable_sharing: row.get(7)?,
        flickr: parse_json_column(&flickr, 8)?,
        instagram: parse_json_column(&instagram, 9)?,
        facebook: parse_json_column(&facebook, 10)?,
        created_at: parse_time_column(&created, 11)?,
        modified_at: parse_time_column(&modified, 12)?,
    })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    raw: &str,
    index: usize,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn parse_time_column(raw: &str, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
