//! SQLite repository implementation
//!
//! Embedded store for detector binaries and runtime configs. Detector rows
//! are keyed by id and always fetched `ORDER BY id`, which keeps root-hash
//! comparisons stable across replicas.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::RepoError;
use crate::logic::config::{HistoryControl, RuntimeConfig};
use crate::logic::detector::hash;

use super::{DetectorRecord, DetectorRepository};

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, RepoError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), RepoError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS detectors (
                id        TEXT PRIMARY KEY,
                version   INTEGER NOT NULL,
                binary    BLOB NOT NULL,
                checksum  TEXT NOT NULL,
                added_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS configs (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                schema_version  TEXT NOT NULL,
                history_control TEXT NOT NULL,
                added_at        TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl DetectorRepository for SqliteRepository {
    fn detector_binaries(&self) -> Result<Vec<DetectorRecord>, RepoError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, version, binary, checksum FROM detectors ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(DetectorRecord {
                id: row.get(0)?,
                version: row.get(1)?,
                binary: row.get(2)?,
                checksum: row.get(3)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn detector_checksums(&self) -> Result<Vec<(String, String)>, RepoError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, checksum FROM detectors ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    fn latest_config(&self) -> Result<Option<RuntimeConfig>, RepoError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT schema_version, history_control FROM configs
                 ORDER BY seq DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((schema_version, history_control)) => {
                let history_control = HistoryControl::parse(&history_control).ok_or_else(|| {
                    RepoError::BadConfig(format!("unknown history control {history_control:?}"))
                })?;
                Ok(Some(RuntimeConfig {
                    schema_version,
                    history_control,
                }))
            }
        }
    }

    fn add_detector(&self, id: &str, version: u32, binary: &[u8]) -> Result<(), RepoError> {
        let conn = self.conn.lock();

        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM detectors WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(RepoError::AlreadyExists(id.to_string()));
        }

        let checksum = hash::hash_binary(binary);
        conn.execute(
            "INSERT INTO detectors (id, version, binary, checksum, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, version, binary, checksum, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove_detector(&self, id: &str) -> Result<bool, RepoError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM detectors WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn add_config(&self, config: &RuntimeConfig) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO configs (schema_version, history_control, added_at)
             VALUES (?1, ?2, ?3)",
            params![
                config.schema_version,
                config.history_control.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_fetch_detectors_ordered() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.add_detector("zeta", 1, b"zzz").unwrap();
        repo.add_detector("alpha", 2, b"aaa").unwrap();

        let records = repo.detector_binaries().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "alpha");
        assert_eq!(records[1].id, "zeta");
        assert_eq!(records[0].checksum, hash::hash_binary(b"aaa"));
    }

    #[test]
    fn test_duplicate_detector_rejected() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.add_detector("rule", 1, b"one").unwrap();
        let err = repo.add_detector("rule", 2, b"two").unwrap_err();
        assert!(matches!(err, RepoError::AlreadyExists(_)));
    }

    #[test]
    fn test_remove_detector() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.add_detector("rule", 1, b"one").unwrap();
        assert!(repo.remove_detector("rule").unwrap());
        assert!(!repo.remove_detector("rule").unwrap());
        assert!(repo.detector_binaries().unwrap().is_empty());
    }

    #[test]
    fn test_checksums_match_binaries() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.add_detector("a", 1, b"first").unwrap();
        repo.add_detector("b", 1, b"second").unwrap();

        let checksums = repo.detector_checksums().unwrap();
        let records = repo.detector_binaries().unwrap();
        for ((id, checksum), record) in checksums.iter().zip(records.iter()) {
            assert_eq!(id, &record.id);
            assert_eq!(checksum, &hash::hash_binary(&record.binary));
        }
    }

    #[test]
    fn test_latest_config_wins() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        assert!(repo.latest_config().unwrap().is_none());

        repo.add_config(&RuntimeConfig::new(HistoryControl::All))
            .unwrap();
        repo.add_config(&RuntimeConfig::new(HistoryControl::None))
            .unwrap();

        let latest = repo.latest_config().unwrap().unwrap();
        assert_eq!(latest.history_control, HistoryControl::None);
    }
}
