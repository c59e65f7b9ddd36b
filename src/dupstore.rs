//! Duplicate store (§4.2): a durable, batch-scoped set of already-accepted
//! QR codes, backed by `rusqlite` (bundled SQLite), matching the same
//! crate this codebase reaches for elsewhere to embed a durable store
//! without standing up a server.
//!
//! `rusqlite::Connection` is `!Sync`, so concurrent callers are serialized
//! through a `std::sync::Mutex` around a single connection, matching the
//! "concurrent callers are serialized internally" guarantee in §4.2.
//! WAL journaling mode gives the crash-safety §4.2 requires.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::SupervisorError;

pub struct DuplicateStore {
    conn: Mutex<Connection>,
}

impl DuplicateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SupervisorError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS duplicates (
                batch TEXT NOT NULL,
                qr TEXT NOT NULL,
                PRIMARY KEY (batch, qr)
            )",
            [],
        )?;
        Ok(DuplicateStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests, sharing the same schema and durability
    /// semantics apart from surviving a process restart.
    pub fn open_in_memory() -> Result<Self, SupervisorError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS duplicates (
                batch TEXT NOT NULL,
                qr TEXT NOT NULL,
                PRIMARY KEY (batch, qr)
            )",
            [],
        )?;
        Ok(DuplicateStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn seen(&self, batch: &str, qr: &str) -> Result<bool, SupervisorError> {
        let conn = self.conn.lock().expect("duplicate store mutex poisoned");
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM duplicates WHERE batch = ?1 AND qr = ?2)",
                rusqlite::params![batch, qr],
                |row| row.get(0),
            )
            .map_err(SupervisorError::from)?;
        Ok(exists)
    }

    /// Idempotent insert: re-recording the same (batch, qr) pair is a
    /// no-op, matching the `INSERT OR IGNORE` idiom for a primary-key
    /// conflict.
    pub fn record(&self, batch: &str, qr: &str) -> Result<(), SupervisorError> {
        let conn = self.conn.lock().expect("duplicate store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO duplicates (batch, qr) VALUES (?1, ?2)",
            rusqlite::params![batch, qr],
        )?;
        Ok(())
    }

    pub fn reset(&self, batch: &str) -> Result<(), SupervisorError> {
        let conn = self.conn.lock().expect("duplicate store mutex poisoned");
        conn.execute("DELETE FROM duplicates WHERE batch = ?1", rusqlite::params![batch])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_idempotent_and_seen_reflects_it() {
        let store = DuplicateStore::open_in_memory().unwrap();
        assert!(!store.seen("B1", "QR1").unwrap());
        store.record("B1", "QR1").unwrap();
        assert!(store.seen("B1", "QR1").unwrap());
        // Re-insert is a no-op, not an error.
        store.record("B1", "QR1").unwrap();
        assert!(store.seen("B1", "QR1").unwrap());
    }

    #[test]
    fn reset_clears_only_the_given_batch() {
        let store = DuplicateStore::open_in_memory().unwrap();
        store.record("B1", "QR1").unwrap();
        store.record("B2", "QR1").unwrap();
        store.reset("B1").unwrap();
        assert!(!store.seen("B1", "QR1").unwrap());
        assert!(store.seen("B2", "QR1").unwrap());
    }

    #[test]
    fn duplicate_scoped_per_batch() {
        let store = DuplicateStore::open_in_memory().unwrap();
        store.record("B1", "QR1").unwrap();
        assert!(!store.seen("B2", "QR1").unwrap());
    }
}
