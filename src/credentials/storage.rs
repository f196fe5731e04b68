//! Encrypted credential storage using SQLite.

use super::{encryption, UserAccess};
use crate::services::{ServiceCredential, ServiceKind};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Credential store backed by SQLite, one row per (service, external user).
///
/// # Schema
/// ```sql
/// CREATE TABLE user_access (
///     service       TEXT NOT NULL,
///     user_id       TEXT NOT NULL,
///     token         TEXT NOT NULL,      -- Encrypted
///     token_nonce   TEXT NOT NULL,
///     secret        TEXT,               -- Encrypted (OAuth 1.0a only)
///     secret_nonce  TEXT,
///     created_at    TEXT NOT NULL,
///     updated_at    TEXT NOT NULL,
///     PRIMARY KEY (service, user_id)
/// );
/// ```
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// `encryption_key` is the base64-encoded 32-byte master key.
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open credential database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS user_access (
                service       TEXT NOT NULL,
                user_id       TEXT NOT NULL,
                token         TEXT NOT NULL,
                token_nonce   TEXT NOT NULL,
                secret        TEXT,
                secret_nonce  TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                PRIMARY KEY (service, user_id)
            )
            "#,
            [],
        )
        .context("Failed to create user_access table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Idempotent upsert: the same external user ID always maps to the same
    /// row, with token fields overwritten by the latest exchange.
    pub fn upsert(
        &self,
        service: ServiceKind,
        user_id: &str,
        credential: &ServiceCredential,
    ) -> Result<()> {
        let (token_enc, token_nonce) = encryption::encrypt(&credential.token, &self.encryption_key)
            .context("Failed to encrypt access token")?;
        let (secret_enc, secret_nonce) = match &credential.secret {
            Some(secret) => {
                let (enc, nonce) = encryption::encrypt(secret, &self.encryption_key)
                    .context("Failed to encrypt token secret")?;
                (Some(enc), Some(nonce))
            }
            None => (None, None),
        };
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO user_access (
                    service, user_id, token, token_nonce,
                    secret, secret_nonce, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(service, user_id) DO UPDATE SET
                    token = excluded.token,
                    token_nonce = excluded.token_nonce,
                    secret = excluded.secret,
                    secret_nonce = excluded.secret_nonce,
                    updated_at = excluded.updated_at
                "#,
                params![
                    service.as_str(),
                    user_id,
                    token_enc,
                    token_nonce,
                    secret_enc,
                    secret_nonce,
                    now,
                    now,
                ],
            )
            .context("Failed to upsert credential")?;
        Ok(())
    }

    /// Fetch and decrypt a credential. Absence is not an error.
    pub fn get(&self, service: ServiceKind, user_id: &str) -> Result<Option<UserAccess>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                r#"
                SELECT token, token_nonce, secret, secret_nonce
                FROM user_access
                WHERE service = ?1 AND user_id = ?2
                "#,
                params![service.as_str(), user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query credential")?;

        let Some((token_enc, token_nonce, secret_enc, secret_nonce)) = row else {
            return Ok(None);
        };

        let token = encryption::decrypt(&token_enc, &token_nonce, &self.encryption_key)
            .context("Failed to decrypt access token")?;
        let secret = match (secret_enc, secret_nonce) {
            (Some(enc), Some(nonce)) => Some(
                encryption::decrypt(&enc, &nonce, &self.encryption_key)
                    .context("Failed to decrypt token secret")?,
            ),
            _ => None,
        };

        Ok(Some(UserAccess {
            service,
            user_id: user_id.to_string(),
            credential: ServiceCredential { token, secret },
        }))
    }

    /// Delete a revoked credential row. The caller clears the back-reference
    /// on any maze that held it.
    pub fn revoke(&self, service: ServiceKind, user_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM user_access WHERE service = ?1 AND user_id = ?2",
                params![service.as_str(), user_id],
            )
            .context("Failed to delete credential")?;
        Ok(rows > 0)
    }
}
