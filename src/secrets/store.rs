//! Versioned, encrypted secret storage using SQLite.

use super::encryption::{Cipher, Sealed};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle of one stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionState {
    Enabled,
    Destroyed,
}

impl VersionState {
    fn as_str(&self) -> &'static str {
        match self {
            VersionState::Enabled => "ENABLED",
            VersionState::Destroyed => "DESTROYED",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "ENABLED" => Ok(VersionState::Enabled),
            "DESTROYED" => Ok(VersionState::Destroyed),
            other => Err(anyhow!("Unknown secret version state '{}'", other)),
        }
    }
}

/// A decrypted secret version.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretVersion {
    pub version: u32,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Version metadata, without the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionInfo {
    pub version: u32,
    pub state: VersionState,
    pub created_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

/// Secret documents keyed by `(project_id, secret_id)`, each with a
/// monotonically increasing version number.
///
/// # Schema
/// ```sql
/// CREATE TABLE secret_versions (
///     project_id TEXT NOT NULL,
///     secret_id TEXT NOT NULL,
///     version INTEGER NOT NULL,
///     payload TEXT,            -- Encrypted JSON, NULL once destroyed
///     payload_nonce TEXT,
///     state TEXT NOT NULL,     -- ENABLED | DESTROYED
///     created_at TEXT NOT NULL,
///     destroyed_at TEXT,
///     PRIMARY KEY (project_id, secret_id, version)
/// );
/// ```
///
/// Destroying a version wipes its payload but keeps the row so version
/// numbers are never reused.
pub struct SecretStore {
    conn: Mutex<Connection>,
    cipher: Cipher,
}

impl SecretStore {
    /// Creates or opens a store. `encryption_key` is a base64 32-byte key.
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher = Cipher::from_base64(encryption_key).context("Invalid encryption key")?;
        let conn = Connection::open(db_path).context("Failed to open secrets database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS secret_versions (
                project_id TEXT NOT NULL,
                secret_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                payload TEXT,
                payload_nonce TEXT,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                destroyed_at TEXT,
                PRIMARY KEY (project_id, secret_id, version)
            )
            "#,
            [],
        )
        .context("Failed to create secret_versions table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Secret store connection lock poisoned"))
    }

    /// Stores `payload` as the next version and returns its number.
    pub fn add_version(&self, project_id: &str, secret_id: &str, payload: &Value) -> Result<u32> {
        let conn = self.conn()?;
        insert_version(&conn, &self.cipher, project_id, secret_id, payload)
    }

    /// Reads a version, or the newest enabled one when `version` is `None`.
    ///
    /// Returns `Ok(None)` when there is no such version or it was destroyed.
    pub fn access(
        &self,
        project_id: &str,
        secret_id: &str,
        version: Option<u32>,
    ) -> Result<Option<SecretVersion>> {
        let conn = self.conn()?;
        let row = match version {
            Some(v) => conn
                .query_row(
                    r#"
                    SELECT version, payload, payload_nonce, created_at FROM secret_versions
                    WHERE project_id = ?1 AND secret_id = ?2 AND version = ?3 AND state = 'ENABLED'
                    "#,
                    params![project_id, secret_id, v],
                    read_sealed_row,
                )
                .optional(),
            None => conn
                .query_row(
                    r#"
                    SELECT version, payload, payload_nonce, created_at FROM secret_versions
                    WHERE project_id = ?1 AND secret_id = ?2 AND state = 'ENABLED'
                    ORDER BY version DESC LIMIT 1
                    "#,
                    params![project_id, secret_id],
                    read_sealed_row,
                )
                .optional(),
        }
        .context("Failed to read secret version")?;

        let Some((version, sealed, created_at)) = row else {
            return Ok(None);
        };

        let plaintext = self
            .cipher
            .open(&sealed)
            .context("Failed to decrypt secret payload")?;
        let payload = serde_json::from_slice(&plaintext).context("Secret payload is not valid JSON")?;

        Ok(Some(SecretVersion {
            version,
            payload,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    /// Newest enabled version number.
    pub fn latest_version(&self, project_id: &str, secret_id: &str) -> Result<Option<u32>> {
        let conn = self.conn()?;
        latest_enabled(&conn, project_id, secret_id)
    }

    /// Wipes a version's payload. Returns false if it was missing or already destroyed.
    pub fn destroy_version(&self, project_id: &str, secret_id: &str, version: u32) -> Result<bool> {
        let conn = self.conn()?;
        destroy(&conn, project_id, secret_id, version)
    }

    /// Adds `payload` as a new version, then destroys the version that was
    /// newest before it. Both happen in one transaction.
    pub fn update(&self, project_id: &str, secret_id: &str, payload: &Value) -> Result<u32> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let previous = latest_enabled(&tx, project_id, secret_id)?;
        let version = insert_version(&tx, &self.cipher, project_id, secret_id, payload)?;
        if let Some(previous) = previous {
            destroy(&tx, project_id, secret_id, previous)?;
        }

        tx.commit().context("Failed to commit secret update")?;
        Ok(version)
    }

    pub fn list_versions(&self, project_id: &str, secret_id: &str) -> Result<Vec<VersionInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT version, state, created_at, destroyed_at FROM secret_versions
                WHERE project_id = ?1 AND secret_id = ?2
                ORDER BY version
                "#,
            )
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map(params![project_id, secret_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .context("Failed to list secret versions")?;

        let mut versions = Vec::new();
        for row in rows {
            let (version, state, created_at, destroyed_at) = row?;
            versions.push(VersionInfo {
                version,
                state: VersionState::parse(&state)?,
                created_at: parse_timestamp(&created_at)?,
                destroyed_at: destroyed_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(versions)
    }
}

fn read_sealed_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u32, Sealed, String)> {
    Ok((
        row.get(0)?,
        Sealed {
            ciphertext: row.get(1)?,
            nonce: row.get(2)?,
        },
        row.get(3)?,
    ))
}

fn insert_version(
    conn: &Connection,
    cipher: &Cipher,
    project_id: &str,
    secret_id: &str,
    payload: &Value,
) -> Result<u32> {
    let plaintext = serde_json::to_vec(payload).context("Failed to serialize secret payload")?;
    let sealed = cipher.seal(&plaintext).context("Failed to encrypt secret payload")?;

    let next: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM secret_versions WHERE project_id = ?1 AND secret_id = ?2",
            params![project_id, secret_id],
            |row| row.get(0),
        )
        .context("Failed to allocate secret version")?;

    conn.execute(
        r#"
        INSERT INTO secret_versions (project_id, secret_id, version, payload, payload_nonce, state, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            project_id,
            secret_id,
            next,
            sealed.ciphertext,
            sealed.nonce,
            VersionState::Enabled.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("Failed to store secret version")?;

    Ok(next)
}

fn latest_enabled(conn: &Connection, project_id: &str, secret_id: &str) -> Result<Option<u32>> {
    conn.query_row(
        r#"
        SELECT MAX(version) FROM secret_versions
        WHERE project_id = ?1 AND secret_id = ?2 AND state = 'ENABLED'
        "#,
        params![project_id, secret_id],
        |row| row.get::<_, Option<u32>>(0),
    )
    .context("Failed to read latest secret version")
}

fn destroy(conn: &Connection, project_id: &str, secret_id: &str, version: u32) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            UPDATE secret_versions
            SET state = ?4, payload = NULL, payload_nonce = NULL, destroyed_at = ?5
            WHERE project_id = ?1 AND secret_id = ?2 AND version = ?3 AND state = 'ENABLED'
            "#,
            params![
                project_id,
                secret_id,
                version,
                VersionState::Destroyed.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to destroy secret version")?;
    Ok(changed > 0)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", s))
}
