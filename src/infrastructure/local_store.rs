use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Synchronous string-keyed durable store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        Ok(connection)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn with_value(key: &str, value: &str) -> Self {
        Self {
            values: Mutex::new(HashMap::from([(key.to_string(), value.to_string())])),
        }
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let values = self
            .values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("kv store lock poisoned: {error}")))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let mut values = self
            .values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("kv store lock poisoned: {error}")))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;

    #[test]
    fn sqlite_store_returns_none_for_absent_key() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("planner.sqlite");
        initialize_database(&db_path).expect("init schema");

        let store = SqliteKeyValueStore::new(&db_path);
        assert_eq!(store.get("containers").expect("read"), None);
    }

    #[test]
    fn sqlite_store_overwrites_existing_value() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("planner.sqlite");
        initialize_database(&db_path).expect("init schema");

        let store = SqliteKeyValueStore::new(&db_path);
        store.set("containers", "[]").expect("first write");
        store.set("containers", "[{\"id\":\"a\"}]").expect("second write");

        let reopened = SqliteKeyValueStore::new(&db_path);
        assert_eq!(
            reopened.get("containers").expect("read"),
            Some("[{\"id\":\"a\"}]".to_string())
        );
    }

    #[test]
    fn sqlite_store_without_schema_reports_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SqliteKeyValueStore::new(dir.path().join("empty.sqlite"));
        assert!(matches!(store.get("containers"), Err(InfraError::Sqlite(_))));
    }

    #[test]
    fn in_memory_store_roundtrip() {
        let store = InMemoryKeyValueStore::with_value("a", "1");
        assert_eq!(store.get("a").expect("read"), Some("1".to_string()));
        store.set("b", "2").expect("write");
        assert_eq!(store.get("b").expect("read"), Some("2".to_string()));
        assert_eq!(store.get("c").expect("read"), None);
    }
}
