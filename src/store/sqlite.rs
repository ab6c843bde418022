//! SQLite-backed account store.
//!
//! Tables:
//! - `accounts`: id, email, email_normalized, first_name, last_name
//! - `legacy_password_hashes`: account_id, legacy_hash, migrated, imported_at, migrated_at
//! - `modern_credentials`: id, account_id, password_hash, updated_at

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    epoch_secs, new_credential_id, normalize_email, Account, AccountStore, LegacyHashRecord,
    ModernCredential,
};
use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        email_normalized TEXT NOT NULL UNIQUE,
        first_name TEXT,
        last_name TEXT
    );

    CREATE TABLE IF NOT EXISTS legacy_password_hashes (
        account_id TEXT PRIMARY KEY REFERENCES accounts(id),
        legacy_hash TEXT NOT NULL,
        migrated INTEGER NOT NULL DEFAULT 0,
        imported_at INTEGER NOT NULL,
        migrated_at INTEGER
    );

    CREATE TABLE IF NOT EXISTS modern_credentials (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL UNIQUE REFERENCES accounts(id),
        password_hash TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );";

/// [`AccountStore`] over a single SQLite connection.
pub struct SqliteAccountStore {
    conn: Mutex<Connection>,
}

impl SqliteAccountStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Self::with_connection(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Add or replace an account.
    ///
    /// The lookup key is computed with [`normalize_email`] here rather than
    /// with SQL `LOWER()`, which only folds ASCII. Two accounts whose emails
    /// normalize the same are a constraint error.
    pub fn insert_account(&self, account: &Account) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO accounts (id, email, email_normalized, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                email_normalized = excluded.email_normalized,
                first_name = excluded.first_name,
                last_name = excluded.last_name",
            params![
                account.id,
                account.email,
                normalize_email(&account.email),
                account.first_name,
                account.last_name
            ],
        )?;
        Ok(())
    }

    /// Record a hash imported from the legacy site, not yet migrated.
    pub fn import_legacy_hash(&self, account_id: &str, legacy_hash: &str) -> StoreResult<()> {
        let result = self.conn.lock().execute(
            "INSERT INTO legacy_password_hashes (account_id, legacy_hash, migrated, imported_at)
             VALUES (?1, ?2, 0, ?3)
             ON CONFLICT(account_id) DO UPDATE SET
                legacy_hash = excluded.legacy_hash,
                migrated = 0,
                imported_at = excluded.imported_at,
                migrated_at = NULL",
            params![account_id, legacy_hash, epoch_secs()],
        );
        map_missing_account(result, account_id)
    }
}

impl AccountStore for SqliteAccountStore {
    fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                "SELECT id, email, first_name, last_name FROM accounts WHERE email_normalized = ?1",
                params![normalized_email],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    fn find_legacy_hash(&self, account_id: &str) -> StoreResult<Option<LegacyHashRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT account_id, legacy_hash, migrated FROM legacy_password_hashes
                 WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(LegacyHashRecord {
                        account_id: row.get(0)?,
                        legacy_hash: row.get(1)?,
                        migrated: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn upsert_modern_credential(
        &self,
        account_id: &str,
        modern_hash: &str,
    ) -> StoreResult<ModernCredential> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO modern_credentials (id, account_id, password_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id) DO UPDATE SET
                password_hash = excluded.password_hash,
                updated_at = excluded.updated_at",
            params![new_credential_id(), account_id, modern_hash, epoch_secs()],
        );
        map_missing_account(result, account_id)?;

        let credential = conn.query_row(
            "SELECT id, account_id, password_hash FROM modern_credentials WHERE account_id = ?1",
            params![account_id],
            credential_from_row,
        )?;
        Ok(credential)
    }

    fn mark_migrated(&self, account_id: &str) -> StoreResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE legacy_password_hashes SET migrated = 1, migrated_at = ?2
             WHERE account_id = ?1 AND migrated = 0",
            params![account_id, epoch_secs()],
        )?;
        Ok(changed == 1)
    }

    fn find_modern_credential(&self, account_id: &str) -> StoreResult<Option<ModernCredential>> {
        let conn = self.conn.lock();
        let credential = conn
            .query_row(
                "SELECT id, account_id, password_hash FROM modern_credentials WHERE account_id = ?1",
                params![account_id],
                credential_from_row,
            )
            .optional()?;
        Ok(credential)
    }
}

fn credential_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModernCredential> {
    Ok(ModernCredential {
        id: row.get(0)?,
        account_id: row.get(1)?,
        modern_hash: row.get(2)?,
    })
}

/// Foreign key failures mean the account does not exist.
fn map_missing_account(result: rusqlite::Result<usize>, account_id: &str) -> StoreResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::UnknownAccount(account_id.to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}
