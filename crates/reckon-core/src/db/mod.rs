//! Database access layer with connection pooling and migrations
//!
//! This module is organized by store:
//! - `ledger` - committed transactions (`LedgerStore`)
//! - `review` - the staged review queue and the accept move (`ReviewStore`)
//! - `rules` - payee rules and usage counters (`RuleStore`)

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{Error, Result};

mod ledger;
mod review;
mod rules;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "RECKON_DB_KEY";

/// How long a connection waits on another writer before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"reckon-salt-v1-f";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let output = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(output.as_bytes()))
}

/// Format a timestamp for storage; fixed width so text order is time order
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored timestamp (RFC 3339, or SQLite's "YYYY-MM-DD HH:MM:SS")
pub(crate) fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Read an ISO date column
pub(crate) fn get_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

/// Read a timestamp column
pub(crate) fn get_datetime(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_datetime(&s).map_err(|e| conversion_error(idx, e))
}

/// Read a nullable timestamp column
pub(crate) fn get_opt_datetime(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_datetime(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Read a decimal amount stored as text
pub(crate) fn get_amount(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    Decimal::from_str(&s).map_err(|e| conversion_error(idx, e))
}

/// Canonical text form of an amount ("-10.5", never "-10.50")
pub(crate) fn amount_to_sql(amount: &Decimal) -> String {
    amount.normalize().to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open an encrypted database
    ///
    /// Requires the `RECKON_DB_KEY` environment variable. The key is derived
    /// from the passphrase via Argon2 and handed to SQLCipher.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Open an unencrypted database (development and tests only)
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Open a database with an explicit encryption passphrase
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Key must be set first on every new connection
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(ref pragma) = key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "reckon_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path, suffix));
        }

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Committed ledger
            CREATE TABLE IF NOT EXISTS ledger_transactions (
                id INTEGER PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                date TEXT NOT NULL,                       -- YYYY-MM-DD
                amount TEXT NOT NULL,                     -- canonical decimal text
                payee TEXT NOT NULL,
                memo TEXT,
                source TEXT NOT NULL DEFAULT '',
                external_id TEXT,
                category TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_tenant ON ledger_transactions(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_ledger_external_id
                ON ledger_transactions(tenant_id, external_id);
            CREATE INDEX IF NOT EXISTS idx_ledger_content
                ON ledger_transactions(tenant_id, date, amount);

            -- Review queue; AUTOINCREMENT keeps keys unique for the life of the file
            CREATE TABLE IF NOT EXISTS staged_import_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                payee TEXT NOT NULL CHECK (payee <> ''),
                memo TEXT,
                source TEXT NOT NULL DEFAULT '',
                external_id TEXT NOT NULL,
                external_id_derived INTEGER NOT NULL DEFAULT 0,
                duplicate_status TEXT NOT NULL
                    CHECK (duplicate_status IN ('new', 'exact_duplicate', 'potential_duplicate')),
                duplicate_of INTEGER REFERENCES ledger_transactions(id),
                is_selected INTEGER NOT NULL DEFAULT 0,
                category TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_staged_tenant ON staged_import_items(tenant_id, id);
            CREATE INDEX IF NOT EXISTS idx_staged_external_id
                ON staged_import_items(tenant_id, external_id);

            -- Payee categorization rules
            CREATE TABLE IF NOT EXISTS payee_rules (
                id INTEGER PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                pattern TEXT NOT NULL CHECK (pattern <> ''),
                is_regex INTEGER NOT NULL DEFAULT 0,
                category TEXT NOT NULL CHECK (category <> ''),
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                last_used_at TEXT,
                match_count INTEGER NOT NULL DEFAULT 0 CHECK (match_count >= 0)
            );

            CREATE INDEX IF NOT EXISTS idx_rules_tenant ON payee_rules(tenant_id, modified_at);
            "#,
        )?;

        info!("Database schema initialized at {}", self.db_path);
        Ok(())
    }
}
