//! SQLite-backed account store.
//!
//! Provides SQLite connectivity and migration management for the
//! `accounts` table, plus an [`AccountStore`] implementation whose save
//! is a guarded `UPDATE ... WHERE version = ?` so concurrent writers
//! cannot clobber each other.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

use super::{normalize_email, AccountRecord, AccountStore};
use crate::{OtpError, Result};

/// Connection pool type used by the SQLite store.
pub type DbPool = sqlx::SqlitePool;

/// Schema migrations, applied in order at open.
pub const MIGRATIONS: &[&str] = &[
    // v1: accounts table
    "CREATE TABLE IF NOT EXISTS accounts (
        email                      TEXT PRIMARY KEY,
        password                   TEXT,
        is_verified                INTEGER NOT NULL DEFAULT 0,
        signup_code_hash           TEXT,
        signup_code_expires_at     TEXT,
        signup_attempts            INTEGER NOT NULL DEFAULT 0,
        reset_code_hash            TEXT,
        reset_code_expires_at      TEXT,
        reset_attempts             INTEGER NOT NULL DEFAULT 0,
        reset_validated_at         TEXT,
        reset_validated_expires_at TEXT,
        otp_request_count          INTEGER NOT NULL DEFAULT 0,
        last_otp_request_at        TEXT,
        version                    INTEGER NOT NULL DEFAULT 0
    )",
];

/// Database wrapper for managing SQLite connections and migrations.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open a database at the specified path.
    ///
    /// The file is created if it doesn't exist, and pending migrations
    /// are applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// Pinned to a single connection: each SQLite in-memory connection
    /// is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");

        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| OtpError::Storage(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        let table_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        )
        .fetch_one(&self.pool)
        .await?;

        if !table_exists {
            return Ok(0);
        }

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;

        Ok(version)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;

        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            debug!("Migration v{} applied successfully", version);
        }

        Ok(())
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=$1)",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// [`AccountStore`] backed by the SQLite `accounts` table.
#[derive(Debug, Clone)]
pub struct SqlAccountStore {
    pool: DbPool,
}

impl SqlAccountStore {
    /// Create a store over an open database.
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

impl AccountStore for SqlAccountStore {
    async fn create(&self, record: &AccountRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (
                email, password, is_verified,
                signup_code_hash, signup_code_expires_at, signup_attempts,
                reset_code_hash, reset_code_expires_at, reset_attempts,
                reset_validated_at, reset_validated_expires_at,
                otp_request_count, last_otp_request_at, version
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(normalize_email(&record.email))
        .bind(&record.password)
        .bind(record.is_verified)
        .bind(&record.signup_code_hash)
        .bind(record.signup_code_expires_at)
        .bind(record.signup_attempts)
        .bind(&record.reset_code_hash)
        .bind(record.reset_code_expires_at)
        .bind(record.reset_attempts)
        .bind(record.reset_validated_at)
        .bind(record.reset_validated_expires_at)
        .bind(record.otp_request_count)
        .bind(record.last_otp_request_at)
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT email, password, is_verified,
                    signup_code_hash, signup_code_expires_at, signup_attempts,
                    reset_code_hash, reset_code_expires_at, reset_attempts,
                    reset_validated_at, reset_validated_expires_at,
                    otp_request_count, last_otp_request_at, version
             FROM accounts WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save(&self, record: &mut AccountRecord) -> Result<()> {
        // Guarded update: only lands if nobody else saved since this
        // record was loaded.
        let result = sqlx::query(
            "UPDATE accounts SET
                password = $1, is_verified = $2,
                signup_code_hash = $3, signup_code_expires_at = $4, signup_attempts = $5,
                reset_code_hash = $6, reset_code_expires_at = $7, reset_attempts = $8,
                reset_validated_at = $9, reset_validated_expires_at = $10,
                otp_request_count = $11, last_otp_request_at = $12,
                version = version + 1
             WHERE email = $13 AND version = $14",
        )
        .bind(&record.password)
        .bind(record.is_verified)
        .bind(&record.signup_code_hash)
        .bind(record.signup_code_expires_at)
        .bind(record.signup_attempts)
        .bind(&record.reset_code_hash)
        .bind(record.reset_code_expires_at)
        .bind(record.reset_attempts)
        .bind(record.reset_validated_at)
        .bind(record.reset_validated_expires_at)
        .bind(record.otp_request_count)
        .bind(record.last_otp_request_at)
        .bind(normalize_email(&record.email))
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(OtpError::Storage(format!(
                "version conflict or missing account: {}",
                record.email
            )));
        }

        record.version += 1;
        Ok(())
    }
}
